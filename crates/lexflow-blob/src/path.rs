//! Deterministic blob-path recipe.
//!
//! `"<norm-tenant>/<yyyy-mm-dd>/<correlation_id>_<sanitized-filename>"`
//!
//! The reactor validates incoming object-store events against this shape
//! before trusting them, so both directions live here.

use chrono::NaiveDate;
use lexflow_core::TenantId;
use uuid::Uuid;

/// Sanitize a client-supplied filename for use in a blob path.
///
/// Characters outside `[A-Za-z0-9.-]` become `_`, runs of `_` collapse
/// to one, and the result is lowercased.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_underscore = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
            out.push(c.to_ascii_lowercase());
            last_was_underscore = false;
        } else if !last_was_underscore {
            out.push('_');
            last_was_underscore = true;
        }
    }

    out
}

/// Compose the deterministic path for an issued upload.
#[must_use]
pub fn blob_path(tenant: &TenantId, date: NaiveDate, correlation_id: Uuid, filename: &str) -> String {
    format!(
        "{}/{}/{}_{}",
        tenant.normalized(),
        date.format("%Y-%m-%d"),
        correlation_id,
        sanitize_filename(filename)
    )
}

/// A blob path decomposed back into its issued components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBlobPath {
    pub tenant_norm: String,
    pub date: NaiveDate,
    pub correlation_id: Uuid,
    pub filename: String,
}

/// Parse a path claimed by an object-store event. `None` means the path
/// was not issued by this system and the event must be ignored.
#[must_use]
pub fn parse_blob_path(path: &str) -> Option<ParsedBlobPath> {
    let mut segments = path.splitn(3, '/');
    let tenant_norm = segments.next()?.to_string();
    let date = NaiveDate::parse_from_str(segments.next()?, "%Y-%m-%d").ok()?;
    let leaf = segments.next()?;

    if tenant_norm.is_empty() || leaf.contains('/') {
        return None;
    }

    // Leaf shape: "<uuid>_<filename>"; the uuid is fixed-width.
    let correlation = leaf.get(..36)?;
    let correlation_id = Uuid::parse_str(correlation).ok()?;
    let filename = leaf.get(36..)?.strip_prefix('_')?;
    if filename.is_empty() {
        return None;
    }

    Some(ParsedBlobPath {
        tenant_norm,
        date,
        correlation_id,
        filename: filename.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_and_collapses() {
        assert_eq!(sanitize_filename("My Claim (final).PDF"), "my_claim_final_.pdf");
        assert_eq!(sanitize_filename("a   b"), "a_b");
        assert_eq!(sanitize_filename("already-clean.pdf"), "already-clean.pdf");
    }

    #[test]
    fn sanitize_collapses_existing_underscores() {
        assert_eq!(sanitize_filename("a__b___c"), "a_b_c");
    }

    #[test]
    fn path_round_trips() {
        let tenant = TenantId::new("Smith & Associates").unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let correlation = Uuid::new_v4();

        let path = blob_path(&tenant, date, correlation, "Test File.pdf");
        assert!(path.starts_with("smith___associates/2026-03-14/"));

        let parsed = parse_blob_path(&path).expect("path should parse");
        assert_eq!(parsed.tenant_norm, "smith___associates");
        assert_eq!(parsed.date, date);
        assert_eq!(parsed.correlation_id, correlation);
        assert_eq!(parsed.filename, "test_file.pdf");
    }

    #[test]
    fn foreign_paths_do_not_parse() {
        assert!(parse_blob_path("no-segments").is_none());
        assert!(parse_blob_path("tenant/not-a-date/xyz").is_none());
        assert!(parse_blob_path("tenant/2026-03-14/not-a-uuid_file.pdf").is_none());
        assert!(parse_blob_path("tenant/2026-03-14/").is_none());
        let uuid = Uuid::new_v4();
        assert!(parse_blob_path(&format!("tenant/2026-03-14/{uuid}_")).is_none());
    }
}
