use super::{run_pipeline, Context};
use mason_core::{ArtifactOptions, RunOptions};

pub fn run(ctx: &Context, opts: &RunOptions) -> Result<u8, String> {
    let options = ArtifactOptions {
        sign: true,
        publish: false,
        collect: true,
    };
    run_pipeline(ctx, opts, options, "signing")
}
