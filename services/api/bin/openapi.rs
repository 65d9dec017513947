use interview_api::router::ApiDoc;
use utoipa::OpenApi;

/// Writes the OpenAPI document for the interview API to `path`.
fn write_openapi(api_doc: utoipa::openapi::OpenApi, path: &str) -> anyhow::Result<()> {
    let json = api_doc.to_pretty_json()?;
    std::fs::write(path, json)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    write_openapi(ApiDoc::openapi(), "openapi.json")
}
