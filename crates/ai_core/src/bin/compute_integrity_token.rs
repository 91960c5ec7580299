use anyhow::{Context, Result};
use penguin_ai_core::{Booster, HashAlgorithm, IntegrityToken};
use std::env;
use std::path::PathBuf;

fn main() -> Result<()> {
    let mut args = env::args().skip(1);
    let model_path = args
        .next()
        .map(PathBuf::from)
        .context("Usage: compute_integrity_token <model.json> [sha256|blake3]")?;
    let algorithm: HashAlgorithm = match args.next() {
        Some(name) => name.parse()?,
        None => HashAlgorithm::Sha256,
    };

    let bytes = std::fs::read(&model_path)
        .with_context(|| format!("Failed to read {}", model_path.display()))?;

    // refuse to fingerprint something the service could not load
    Booster::from_json_slice(&bytes)
        .with_context(|| format!("{} is not a loadable model", model_path.display()))?;

    println!("{}", IntegrityToken::compute(algorithm, &bytes));
    Ok(())
}
