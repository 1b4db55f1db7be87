use super::{run_pipeline, Context};
use mason_core::{ArtifactOptions, RunOptions};

pub fn run(ctx: &Context, opts: &RunOptions) -> Result<u8, String> {
    let options = ArtifactOptions {
        collect: true,
        ..ArtifactOptions::default()
    };
    run_pipeline(ctx, opts, options, "building")
}
