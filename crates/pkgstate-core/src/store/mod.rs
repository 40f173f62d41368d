//! JSON-backed persistent stores.
//!
//! Every store file is a versioned envelope:
//!
//! ```json
//! { "version": 1, "object": ... }
//! ```
//!
//! Loading dispatches on `version`; an unknown version is a hard error and no
//! partial state is returned. Writing always emits the latest version with
//! pretty-printed, key-ordered output so repeated saves are byte-identical.

pub mod mirrors;
pub mod pins;
pub mod state;

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::errors::{PkgStateError, PkgStateResult};

#[derive(Serialize)]
struct Envelope<'a, T> {
    version: i64,
    object: &'a T,
}

/// A parsed document before its payload is interpreted.
pub(crate) struct RawDocument {
    /// `None` for legacy documents written without an envelope.
    pub version: Option<i64>,
    pub object: Value,
}

pub(crate) fn parse_document(path: &Path, text: &str) -> PkgStateResult<RawDocument> {
    let mut value: Value =
        serde_json::from_str(text).map_err(|e| PkgStateError::malformed(path, e))?;
    if !value.is_object() {
        return Err(PkgStateError::malformed(path, "expected a JSON object"));
    }
    let version = match value.get("version") {
        None => None,
        Some(v) => Some(
            v.as_i64()
                .ok_or_else(|| PkgStateError::malformed(path, "'version' is not an integer"))?,
        ),
    };
    let object = match version {
        None => value,
        Some(_) => value.get_mut("object").map(Value::take).unwrap_or(Value::Null),
    };
    Ok(RawDocument { version, object })
}

/// Interpret a document payload as `T`.
pub(crate) fn decode<T: DeserializeOwned>(path: &Path, object: Value) -> PkgStateResult<T> {
    serde_json::from_value(object).map_err(|e| PkgStateError::malformed(path, e))
}

/// Render `object` inside a versioned envelope, newline-terminated.
pub(crate) fn encode<T: Serialize>(version: i64, object: &T) -> PkgStateResult<String> {
    let mut out = serde_json::to_string_pretty(&Envelope { version, object })?;
    out.push('\n');
    Ok(out)
}
