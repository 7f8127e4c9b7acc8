//! Payload validators and `Link` header helpers

use crate::errors::InvalidResponse;
use crate::types::HttpResponse;
use serde::de::DeserializeOwned;

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];
const JPEG_TRAILER: [u8; 2] = [0xff, 0xd9];

/// Deserialize the body as JSON
pub fn json_body<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, InvalidResponse> {
    serde_json::from_slice(&response.body)
        .map_err(|e| InvalidResponse(format!("Payload is not valid JSON! {}", e)))
}

/// The body, if it starts with the PNG file signature
pub fn png_body(response: &HttpResponse) -> Result<&[u8], InvalidResponse> {
    if !response.body.starts_with(&PNG_SIGNATURE) {
        return Err(InvalidResponse(format!(
            "Payload is not a valid PNG! First 8 bytes were: {}",
            hex(response.body.iter().take(8))
        )));
    }
    Ok(&response.body)
}

/// The body, if it ends with the JPEG end-of-image marker
pub fn jpeg_body(response: &HttpResponse) -> Result<&[u8], InvalidResponse> {
    if !response.body.ends_with(&JPEG_TRAILER) {
        let tail = response.body.len().saturating_sub(2);
        return Err(InvalidResponse(format!(
            "Payload is not a valid JPEG! Last 2 bytes were: {}",
            hex(response.body[tail..].iter())
        )));
    }
    Ok(&response.body)
}

/// One entry of a `Link` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLink {
    pub url: String,
    /// Link parameters such as `rel`, lower-cased names, unquoted values
    pub params: Vec<(String, String)>,
}

impl HeaderLink {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// All links in the `Link` header; malformed entries are skipped
pub fn header_links(response: &HttpResponse) -> Vec<HeaderLink> {
    let Some(value) = response.header("link") else {
        return Vec::new();
    };

    value
        .split(", <")
        .filter_map(|entry| {
            let entry = entry.trim().trim_start_matches('<');
            let (url, params) = entry.split_once('>')?;
            let params = params
                .split(';')
                .filter_map(|param| {
                    let (name, value) = param.split_once('=')?;
                    Some((
                        name.trim().to_ascii_lowercase(),
                        value.trim().trim_matches(|c| c == '"' || c == '\'').to_string(),
                    ))
                })
                .collect();
            Some(HeaderLink {
                url: url.trim().to_string(),
                params,
            })
        })
        .collect()
}

/// URL of the first link with the given `rel`
pub fn header_link(response: &HttpResponse, rel: &str) -> Option<String> {
    header_links(response)
        .into_iter()
        .find(|link| link.param("rel") == Some(rel))
        .map(|link| link.url)
}

fn hex<'a>(bytes: impl Iterator<Item = &'a u8>) -> String {
    bytes.map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HttpRequest;
    use serde_json::Value as JsonValue;

    fn response_with(body: impl Into<Vec<u8>>) -> HttpResponse {
        HttpResponse::new(HttpRequest::get("http://example.com/"), 200).with_body(body)
    }

    #[test]
    fn test_json_body() {
        let value: JsonValue = json_body(&response_with(r#"{"items":[1,2]}"#)).unwrap();
        assert_eq!(value["items"][1], 2);

        let err = json_body::<JsonValue>(&response_with("<html>")).unwrap_err();
        assert!(err.0.starts_with("Payload is not valid JSON!"));
    }

    #[test]
    fn test_png_signature() {
        let mut png = PNG_SIGNATURE.to_vec();
        png.extend_from_slice(b"IHDR");
        assert!(png_body(&response_with(png)).is_ok());

        let err = png_body(&response_with(b"GIF89a..".to_vec())).unwrap_err();
        assert!(err.0.ends_with("4749463839612e2e"));
    }

    #[test]
    fn test_jpeg_trailer() {
        assert!(jpeg_body(&response_with(vec![0xff, 0xd8, 0x00, 0xff, 0xd9])).is_ok());
        let err = jpeg_body(&response_with(vec![0xff, 0xd8, 0x00])).unwrap_err();
        assert!(err.0.ends_with("d800"));
        assert!(jpeg_body(&response_with(Vec::new())).is_err());
    }

    #[test]
    fn test_header_links() {
        let response = response_with("").with_header(
            "Link",
            r#"<https://api.example.com/items?page=2>; rel="next", <https://api.example.com/items?page=9>; rel="last""#,
        );
        let links = header_links(&response);
        assert_eq!(links.len(), 2);
        assert_eq!(links[1].param("rel"), Some("last"));
        assert_eq!(
            header_link(&response, "next").as_deref(),
            Some("https://api.example.com/items?page=2")
        );
        assert_eq!(header_link(&response, "prev"), None);
    }

    #[test]
    fn test_missing_or_garbage_link_header() {
        assert!(header_links(&response_with("")).is_empty());
        let garbage = response_with("").with_header("Link", "nonsense");
        assert!(header_links(&garbage).is_empty());
        assert_eq!(header_link(&garbage, "next"), None);
    }
}
