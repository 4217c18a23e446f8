use crate::domain::models::{Hash, ReferenceName, RevisionRecord, Signature};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

pub(crate) const RECORD_SEPARATOR: u8 = 0x1e;
const FIELD_SEPARATOR: char = '\x1f';
const FIELD_COUNT: usize = 12;

/// One record per revision, prefixed with the record separator.
pub(crate) const LOG_FORMAT: &str =
    "--format=%x1e%H%x1f%T%x1f%P%x1f%an%x1f%ae%x1f%at%x1f%cn%x1f%ce%x1f%ct%x1f%D%x1f%s%x1f%b";

pub(crate) fn parse_record(text: &str) -> Result<RevisionRecord> {
    let text = text.trim_start_matches(['\n', RECORD_SEPARATOR as char]);
    let text = text.strip_suffix(RECORD_SEPARATOR as char).unwrap_or(text);
    let fields: Vec<&str> = text.splitn(FIELD_COUNT, FIELD_SEPARATOR).collect();
    if fields.len() != FIELD_COUNT {
        return Err(anyhow!(
            "expected {FIELD_COUNT} fields in log record, found {}",
            fields.len()
        ));
    }

    let hash = parse_hash(fields[0]).context("revision hash")?;
    let tree = parse_hash(fields[1]).context("tree hash")?;
    let parents = fields[2]
        .split_whitespace()
        .map(parse_hash)
        .collect::<Result<Vec<_>>>()
        .context("parent hashes")?;

    Ok(RevisionRecord {
        hash,
        tree,
        parents,
        author: parse_signature(fields[3], fields[4], fields[5]).context("author")?,
        committer: parse_signature(fields[6], fields[7], fields[8]).context("committer")?,
        references: parse_decorations(fields[9]),
        subject: fields[10].to_string(),
        body: fields[11].trim_end().to_string(),
    })
}

fn parse_hash(text: &str) -> Result<Hash> {
    Hash::parse(text).ok_or_else(|| anyhow!("invalid hash '{text}'"))
}

fn parse_signature(name: &str, email: &str, timestamp: &str) -> Result<Signature> {
    let secs: i64 = timestamp
        .trim()
        .parse()
        .with_context(|| format!("invalid timestamp '{timestamp}'"))?;
    let when: DateTime<Utc> = DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| anyhow!("timestamp out of range: {secs}"))?;
    Ok(Signature {
        name: name.to_string(),
        email: email.to_string(),
        when,
    })
}

/// Parses `%D` output produced with `--decorate=full`.
fn parse_decorations(text: &str) -> Vec<ReferenceName> {
    let mut refs = Vec::new();
    for item in text.split(", ").map(str::trim).filter(|s| !s.is_empty()) {
        if let Some(target) = item.strip_prefix("HEAD -> ") {
            refs.push(ReferenceName::Head);
            refs.push(ReferenceName::parse(target));
        } else if let Some(tag) = item.strip_prefix("tag: ") {
            refs.push(ReferenceName::parse(tag));
        } else {
            refs.push(ReferenceName::parse(item));
        }
    }
    refs
}
