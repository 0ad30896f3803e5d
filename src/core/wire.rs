//! Response line format
//!
//! Every command renders to exactly one line on stdout. This module is
//! the single place that knows the line grammar: status and error
//! tokens, listing records, and the recovery prefix. Encode and decode
//! are both provided so that callers scripting the binary can parse
//! responses with the same rules that produced them.
//!
//! Listing grammar:
//!
//! ```text
//! NONE
//! <name>,<start>,<size>[;<name>,<start>,<size>]*
//! WARNING:<Cause>;FIX:Salvaged_<n>_Dropped_<m>[;<records>]
//! ```
//!
//! Fields are joined with `;`, no trailing delimiter. Names never
//! contain `,` or `;` (rejected at creation), so records need no
//! escaping. `:` is legal in names, though: a leading `WARNING:` field
//! is a recovery prefix only when it carries no `,`, since a record
//! field always has two.

use crate::core::directory::FileEntry;
use crate::core::error::{FsError, Result};
use crate::core::image::{RecoveryCause, RecoveryReport};

/// Listing body for an empty directory on a clean load.
pub const EMPTY_LISTING: &str = "NONE";

pub const OK_UPDATED: &str = "SUCCESS:Updated_Content";
pub const OK_DELETED: &str = "SUCCESS:Deleted";
pub const OK_HALTED: &str = "SUCCESS:System_Halted";
pub const OK_DEFRAGMENTED: &str = "SUCCESS:Defragmentation_Complete";

/// Success line for `create`, carrying the allocated start block.
pub fn created_at(start: u64) -> String {
    format!("SUCCESS:Created_at_Block_{start}")
}

/// Map an operation failure to its wire token. Total over `FsError` so
/// the dispatcher can never panic while rendering a failure.
pub fn error_token(err: &FsError) -> &'static str {
    match err {
        FsError::DuplicateName(_) => "ERROR:File_Exists",
        FsError::NotFound(_) => "ERROR:File_Not_Found",
        FsError::InvalidName(_) => "ERROR:Invalid_Name",
        FsError::OutOfSpace { .. } => "ERROR:Out_Of_Space",
        FsError::InvalidGeometry(_) => "ERROR:Invalid_Geometry",
        FsError::Busy { .. } => "ERROR:Busy",
        // Internal failures all surface as an I/O fault; the log line
        // carries the detail.
        FsError::InvalidRange { .. }
        | FsError::Corrupted(_)
        | FsError::MalformedResponse(_)
        | FsError::Io(_)
        | FsError::Serialization(_) => "ERROR:Io_Failure",
    }
}

/// One parsed listing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRecord {
    pub name: String,
    pub start: u64,
    pub size: u64,
}

/// A fully parsed listing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub report: Option<RecoveryReport>,
    pub records: Vec<ListRecord>,
}

fn cause_token(cause: RecoveryCause) -> &'static str {
    match cause {
        RecoveryCause::HeaderMismatch => "Header_Mismatch",
        RecoveryCause::TruncatedImage => "Truncated_Write",
        RecoveryCause::ChecksumMismatch => "Metadata_Checksum_Mismatch",
        RecoveryCause::UncleanShutdown => "Unclean_Shutdown_Detected",
        RecoveryCause::InconsistentAllocation => "Allocation_Table_Inconsistent",
    }
}

fn parse_cause(token: &str) -> Option<RecoveryCause> {
    match token {
        "Header_Mismatch" => Some(RecoveryCause::HeaderMismatch),
        "Truncated_Write" => Some(RecoveryCause::TruncatedImage),
        "Metadata_Checksum_Mismatch" => Some(RecoveryCause::ChecksumMismatch),
        "Unclean_Shutdown_Detected" => Some(RecoveryCause::UncleanShutdown),
        "Allocation_Table_Inconsistent" => Some(RecoveryCause::InconsistentAllocation),
        _ => None,
    }
}

/// Render a listing. A recovery report, when present, prefixes the
/// records with a `WARNING` and a `FIX` field; a clean empty directory
/// renders as `NONE`.
pub fn encode_listing(entries: &[FileEntry], report: Option<&RecoveryReport>) -> String {
    let mut fields: Vec<String> = Vec::with_capacity(entries.len() + 2);

    if let Some(report) = report {
        fields.push(format!("WARNING:{}", cause_token(report.cause)));
        fields.push(format!(
            "FIX:Salvaged_{}_Dropped_{}",
            report.salvaged, report.dropped
        ));
    } else if entries.is_empty() {
        return EMPTY_LISTING.to_string();
    }

    for entry in entries {
        fields.push(format!("{},{},{}", entry.name, entry.start, entry.size));
    }

    fields.join(";")
}

/// Parse a listing line produced by [`encode_listing`].
pub fn decode_listing(line: &str) -> Result<Listing> {
    if line == EMPTY_LISTING {
        return Ok(Listing {
            report: None,
            records: Vec::new(),
        });
    }
    if line.is_empty() {
        return Err(FsError::MalformedResponse("empty listing line".into()));
    }

    let mut fields: Vec<&str> = line.split(';').collect();

    // A prefix field never contains `,`; a record field always does.
    // That is what keeps a file named `WARNING:...` a record.
    let report = if fields[0].starts_with("WARNING:") && !fields[0].contains(',') {
        if fields.len() < 2 {
            return Err(FsError::MalformedResponse(
                "recovery prefix without FIX field".into(),
            ));
        }
        let cause = fields[0]
            .strip_prefix("WARNING:")
            .and_then(parse_cause)
            .ok_or_else(|| {
                FsError::MalformedResponse(format!("unknown recovery cause `{}`", fields[0]))
            })?;
        let (salvaged, dropped) = parse_fix(fields[1])?;
        fields.drain(..2);
        Some(RecoveryReport {
            cause,
            salvaged,
            dropped,
        })
    } else {
        None
    };

    let records = fields
        .into_iter()
        .map(parse_record)
        .collect::<Result<Vec<_>>>()?;

    Ok(Listing { report, records })
}

fn parse_fix(field: &str) -> Result<(usize, usize)> {
    let malformed = || FsError::MalformedResponse(format!("bad FIX field `{field}`"));

    let body = field.strip_prefix("FIX:Salvaged_").ok_or_else(malformed)?;
    let (salvaged, dropped) = body.split_once("_Dropped_").ok_or_else(malformed)?;
    Ok((
        salvaged.parse().map_err(|_| malformed())?,
        dropped.parse().map_err(|_| malformed())?,
    ))
}

fn parse_record(field: &str) -> Result<ListRecord> {
    let parts: Vec<&str> = field.split(',').collect();
    if parts.len() != 3 {
        return Err(FsError::MalformedResponse(format!(
            "record `{field}` has {} fields, expected name,start,size",
            parts.len()
        )));
    }
    if parts[0].is_empty() {
        return Err(FsError::MalformedResponse(format!(
            "record `{field}` has an empty name"
        )));
    }
    let start: u64 = parts[1]
        .parse()
        .map_err(|_| FsError::MalformedResponse(format!("bad start block in `{field}`")))?;
    let size: u64 = parts[2]
        .parse()
        .map_err(|_| FsError::MalformedResponse(format!("bad size in `{field}`")))?;

    Ok(ListRecord {
        name: parts[0].to_string(),
        start,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, start: u64, blocks: u64, size: u64) -> FileEntry {
        FileEntry {
            name: name.to_string(),
            start,
            blocks,
            size,
        }
    }

    #[test]
    fn test_clean_empty_encodes_as_none() {
        assert_eq!(encode_listing(&[], None), "NONE");
        let listing = decode_listing("NONE").unwrap();
        assert!(listing.report.is_none());
        assert!(listing.records.is_empty());
    }

    #[test]
    fn test_records_round_trip() {
        let entries = vec![entry("alpha", 0, 3, 2100), entry("beta", 3, 1, 64)];
        let line = encode_listing(&entries, None);
        assert_eq!(line, "alpha,0,2100;beta,3,64");

        let listing = decode_listing(&line).unwrap();
        assert!(listing.report.is_none());
        assert_eq!(
            listing.records,
            vec![
                ListRecord {
                    name: "alpha".to_string(),
                    start: 0,
                    size: 2100
                },
                ListRecord {
                    name: "beta".to_string(),
                    start: 3,
                    size: 64
                },
            ]
        );
    }

    #[test]
    fn test_recovery_prefix_round_trip() {
        let report = RecoveryReport {
            cause: RecoveryCause::UncleanShutdown,
            salvaged: 2,
            dropped: 1,
        };
        let entries = vec![entry("kept", 0, 1, 10), entry("also", 1, 1, 10)];
        let line = encode_listing(&entries, Some(&report));
        assert_eq!(
            line,
            "WARNING:Unclean_Shutdown_Detected;FIX:Salvaged_2_Dropped_1;kept,0,10;also,1,10"
        );

        let listing = decode_listing(&line).unwrap();
        assert_eq!(listing.report, Some(report));
        assert_eq!(listing.records.len(), 2);
    }

    #[test]
    fn test_recovery_with_empty_directory_has_no_records() {
        let report = RecoveryReport {
            cause: RecoveryCause::ChecksumMismatch,
            salvaged: 0,
            dropped: 3,
        };
        let line = encode_listing(&[], Some(&report));
        assert_eq!(
            line,
            "WARNING:Metadata_Checksum_Mismatch;FIX:Salvaged_0_Dropped_3"
        );

        let listing = decode_listing(&line).unwrap();
        assert_eq!(listing.report, Some(report));
        assert!(listing.records.is_empty());
    }

    #[test]
    fn test_warning_prefixed_name_is_a_record_not_a_prefix() {
        let entries = vec![entry("WARNING:x", 0, 2, 5)];
        let line = encode_listing(&entries, None);
        assert_eq!(line, "WARNING:x,0,5");

        let listing = decode_listing(&line).unwrap();
        assert!(listing.report.is_none());
        assert_eq!(
            listing.records,
            vec![ListRecord {
                name: "WARNING:x".to_string(),
                start: 0,
                size: 5
            }]
        );
    }

    #[test]
    fn test_recovery_prefix_coexists_with_warning_prefixed_name() {
        let report = RecoveryReport {
            cause: RecoveryCause::TruncatedImage,
            salvaged: 1,
            dropped: 0,
        };
        let entries = vec![entry("WARNING:x", 0, 1, 4)];
        let line = encode_listing(&entries, Some(&report));
        assert_eq!(
            line,
            "WARNING:Truncated_Write;FIX:Salvaged_1_Dropped_0;WARNING:x,0,4"
        );

        let listing = decode_listing(&line).unwrap();
        assert_eq!(listing.report, Some(report));
        assert_eq!(listing.records[0].name, "WARNING:x");
    }

    #[test]
    fn test_every_cause_round_trips() {
        for cause in [
            RecoveryCause::HeaderMismatch,
            RecoveryCause::TruncatedImage,
            RecoveryCause::ChecksumMismatch,
            RecoveryCause::UncleanShutdown,
            RecoveryCause::InconsistentAllocation,
        ] {
            assert_eq!(parse_cause(cause_token(cause)), Some(cause));
        }
    }

    #[test]
    fn test_decode_rejects_trailing_delimiter() {
        assert!(decode_listing("alpha,0,5;").is_err());
    }

    #[test]
    fn test_decode_rejects_wrong_arity() {
        assert!(decode_listing("alpha,0").is_err());
        assert!(decode_listing("alpha,0,5,9").is_err());
    }

    #[test]
    fn test_decode_rejects_non_numeric_fields() {
        assert!(decode_listing("alpha,zero,5").is_err());
        assert!(decode_listing("alpha,0,five").is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_cause_and_missing_fix() {
        assert!(decode_listing("WARNING:Gremlins;FIX:Salvaged_0_Dropped_0").is_err());
        assert!(decode_listing("WARNING:Unclean_Shutdown_Detected").is_err());
        assert!(decode_listing("WARNING:Unclean_Shutdown_Detected;FIX:Salvaged_x_Dropped_0").is_err());
    }

    #[test]
    fn test_tokens_carry_required_markers() {
        assert!(created_at(7).contains("SUCCESS"));
        assert_eq!(created_at(7), "SUCCESS:Created_at_Block_7");
        for token in [OK_UPDATED, OK_DELETED, OK_HALTED, OK_DEFRAGMENTED] {
            assert!(token.starts_with("SUCCESS:"));
        }
        for err in [
            FsError::DuplicateName("x".into()),
            FsError::NotFound("x".into()),
            FsError::InvalidName("x".into()),
            FsError::OutOfSpace {
                requested: 9,
                largest_free: 1,
            },
            FsError::Busy { waited_ms: 2000 },
        ] {
            assert!(error_token(&err).starts_with("ERROR:"));
        }
        assert_eq!(
            error_token(&FsError::DuplicateName("x".into())),
            "ERROR:File_Exists"
        );
        assert_eq!(
            error_token(&FsError::NotFound("x".into())),
            "ERROR:File_Not_Found"
        );
    }
}
