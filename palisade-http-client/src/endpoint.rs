//! URL resolution and endpoint keys.

use http::Method;
use url::Url;

use crate::{ErrorKind, HttpError, Result};

/// Resolve `url` against `base_url` and append `query`.
///
/// Absolute URLs ignore the base.
pub fn resolve_url(base_url: Option<&str>, url: &str, query: &[(String, String)]) -> Result<Url> {
    let invalid = |e: url::ParseError| {
        HttpError::new(ErrorKind::Unknown, format!("Invalid URL: {e}"), url).with_source(e)
    };

    let mut resolved = match Url::parse(url) {
        Ok(absolute) => absolute,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = base_url.ok_or_else(|| invalid(url::ParseError::RelativeUrlWithoutBase))?;
            Url::parse(base).and_then(|b| b.join(url)).map_err(invalid)?
        }
        Err(e) => return Err(invalid(e)),
    };

    if !query.is_empty() {
        let mut pairs = resolved.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }

    Ok(resolved)
}

/// Key scoping per-endpoint state: `"METHOD origin+path"`.
///
/// Query string and fragment are ignored.
pub fn endpoint_key(method: &Method, url: &Url) -> String {
    format!(
        "{} {}{}",
        method.as_str(),
        url.origin().ascii_serialization(),
        url.path()
    )
}
