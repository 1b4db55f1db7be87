use super::{
    ensure_prereqs, json_pretty, load_metadata, load_user_config, print_processed, run_pipeline,
    Context, EXIT_SUCCESS,
};
use mason_core::{ArtifactOptions, Engine, RunOptions};

pub fn run(ctx: &Context, opts: &RunOptions, skip_build: bool) -> Result<u8, String> {
    if skip_build {
        return publish_prebuilt(ctx);
    }
    let meta = load_metadata(ctx)?;
    let options = ArtifactOptions {
        sign: !meta.publish_info.skip_signing,
        publish: true,
        collect: false,
    };
    run_pipeline(ctx, opts, options, "publishing")
}

/// Sign and upload the declared publish targets as found in the current directory.
fn publish_prebuilt(ctx: &Context) -> Result<u8, String> {
    let meta = load_metadata(ctx)?;
    let user = load_user_config()?;
    ensure_prereqs(&meta, &user, false, !meta.publish_info.skip_signing)?;
    let source = std::env::current_dir().map_err(|e| format!("failed to resolve cwd: {e}"))?;
    let engine = Engine::new(user);

    let published = engine
        .publish_prebuilt(&meta, &source)
        .map_err(|e| e.to_string())?;
    if ctx.json {
        let payload = serde_json::json!({
            "package": meta.package,
            "version": meta.version,
            "artifacts": published,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("published:");
        print_processed(&published);
    }
    Ok(EXIT_SUCCESS)
}
