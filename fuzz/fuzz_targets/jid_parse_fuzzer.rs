//! Fuzz target for jid and record id parsing
//!
//! # Invariants
//!
//! - Parsing arbitrary text never panics
//! - A parsed jid renders to a record id that parses back to the same address
//! - Distinct addresses render to distinct record ids

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sigkeep_core::{ProtocolAddress, SenderKeyName};

#[derive(Debug, Clone, Arbitrary)]
struct JidInput {
    jid: String,
    other_jid: String,
    record_id: String,
    group_id: String,
}

fuzz_target!(|input: JidInput| {
    let _ = input.record_id.parse::<ProtocolAddress>();

    let Ok(address) = ProtocolAddress::from_jid(&input.jid) else {
        return;
    };
    let parsed: ProtocolAddress =
        address.to_string().parse().expect("record id of a parsed jid must parse");
    assert_eq!(parsed, address);

    if let Ok(other) = ProtocolAddress::from_jid(&input.other_jid) {
        assert_eq!(address == other, address.to_string() == other.to_string());
    }

    let name = SenderKeyName::new(input.group_id, address.clone());
    let suffix = format!("::{}::{}", address.user(), address.device());
    assert!(name.to_string().ends_with(&suffix));
});
