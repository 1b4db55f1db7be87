use super::{json_pretty, load_metadata, Context, EXIT_FAILURE, EXIT_SUCCESS};
use mason_schema::BuildMetadata;
use mason_signing::{signature_path, verify_file};
use std::path::Path;

pub fn run(ctx: &Context, file: &Path) -> Result<u8, String> {
    // Outside a project the default program and keyring apply.
    let meta = if ctx.metadata_path.exists() {
        load_metadata(ctx)?
    } else {
        BuildMetadata::default()
    };
    let valid = verify_file(file, &meta).map_err(|e| e.to_string())?;

    if ctx.json {
        let payload = serde_json::json!({
            "file": file,
            "signature": signature_path(file),
            "valid": valid,
        });
        println!("{}", json_pretty(&payload)?);
    } else if valid {
        println!("good signature for {}", file.display());
    } else {
        eprintln!("BAD signature for {}", file.display());
    }
    Ok(if valid { EXIT_SUCCESS } else { EXIT_FAILURE })
}
