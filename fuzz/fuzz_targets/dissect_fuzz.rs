//! Dissector fuzz target: feed arbitrary packets to the shipped grammars.
//! Dissection must not panic; every input ends in Ok(Dissection) or Err(DissectError).
//! Build with: cargo fuzz run dissect_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fn grammars() -> &'static protodissect::GrammarSet {
    use std::sync::OnceLock;
    static SET: OnceLock<protodissect::GrammarSet> = OnceLock::new();
    SET.get_or_init(|| {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../grammars");
        protodissect::GrammarSet::load_dir(&dir).unwrap_or_default()
    })
}

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let mut ctx = protodissect::StreamContext::new();
    let _ = protodissect::dissect(data, grammars(), protodissect::Options::default(), &mut ctx);
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run dissect_fuzz");
}
