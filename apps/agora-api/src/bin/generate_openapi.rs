use std::fs;
use std::path::Path;

use utoipa::OpenApi;

fn main() {
    let json = agora_api::routes::ApiDoc::openapi()
        .to_pretty_json()
        .expect("serialize OpenAPI document");

    let out = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../specs/agora-api.json");
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent).expect("create specs directory");
    }
    fs::write(&out, json).expect("write OpenAPI document");
    println!("Wrote {}", out.display());
}
