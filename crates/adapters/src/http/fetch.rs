use domain::common::error::DomainError;

/// Download a text body with a hard size cap, streamed in chunks so a
/// hostile source cannot balloon memory past the cap.
pub async fn fetch_text_capped(
    client: &reqwest::Client,
    url: &str,
    cap: usize,
) -> Result<String, DomainError> {
    let mut response = client.get(url).send().await.map_err(|e| {
        DomainError::BackendUnavailable(format!("import fetch failed for '{url}': {e}"))
    })?;

    if !response.status().is_success() {
        return Err(DomainError::BackendUnavailable(format!(
            "import source '{url}' returned HTTP {}",
            response.status()
        )));
    }

    let content_length: usize = response
        .content_length()
        .unwrap_or(0)
        .try_into()
        .unwrap_or(usize::MAX);
    if content_length > cap {
        return Err(DomainError::InvalidInput(format!(
            "import source '{url}' is {content_length} bytes (cap {cap})"
        )));
    }

    let mut body: Vec<u8> = Vec::with_capacity(content_length.min(cap));
    while let Some(chunk) = response.chunk().await.map_err(|e| {
        DomainError::BackendUnavailable(format!("import body read failed for '{url}': {e}"))
    })? {
        if body.len() + chunk.len() > cap {
            return Err(DomainError::InvalidInput(format!(
                "import source '{url}' exceeded the {cap} byte cap"
            )));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}
