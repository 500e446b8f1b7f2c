//! Key layout for the embedded KV backend (§4.A).

use sha2::{Digest, Sha256};

fn hash_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn book(id: &str) -> String {
    format!("book:{id}")
}

pub fn idx_path(path: &str) -> String {
    format!("idx:path:{}", hash_hex(path))
}

pub fn idx_hash(hash: &str) -> String {
    format!("idx:hash:{hash}")
}

pub fn idx_orig(hash: &str) -> String {
    format!("idx:orig:{hash}")
}

pub fn idx_org(hash: &str) -> String {
    format!("idx:org:{hash}")
}

pub fn author(id: u64) -> String {
    format!("author:{id}")
}

pub fn idx_author_name(norm: &str) -> String {
    format!("idx:author:name:{norm}")
}

pub fn series(id: u64) -> String {
    format!("series:{id}")
}

pub fn idx_series_name(author_id: u64, norm: &str) -> String {
    format!("idx:series:name:{author_id}:{norm}")
}

pub fn counter(entity: &str) -> String {
    format!("counter:{entity}")
}

pub fn import_path(id: u64) -> String {
    format!("import_path:{id}")
}

pub fn import_path_prefix() -> &'static str {
    "import_path:"
}

pub fn op(id: &str) -> String {
    format!("op:{id}")
}

pub fn op_prefix() -> &'static str {
    "op:"
}

pub fn oplog(op_id: &str, seq: u64) -> String {
    format!("oplog:{op_id}:{seq:020}")
}

pub fn oplog_prefix(op_id: &str) -> String {
    format!("oplog:{op_id}:")
}

pub fn opstate(op_id: &str) -> String {
    format!("opstate:{op_id}")
}

pub fn opparams(op_id: &str) -> String {
    format!("opparams:{op_id}")
}

pub fn setting(key: &str) -> String {
    format!("setting:{key}")
}

pub fn dni(hash: &str) -> String {
    format!("dni:{hash}")
}

pub fn fingerprint(path: &str) -> String {
    format!("fp:{}", hash_hex(path))
}

pub fn field_state(book_id: &str, field: &str) -> String {
    format!("fieldstate:{book_id}:{field}")
}

pub fn field_state_prefix(book_id: &str) -> String {
    format!("fieldstate:{book_id}:")
}

pub fn meta_schema_version() -> &'static str {
    "meta:schema_version"
}
