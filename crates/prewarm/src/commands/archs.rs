//! Archs command

use anyhow::Result;
use prewarm_core::types::{ArchToken, ALL_ARCHES};

pub fn run() -> Result<()> {
    for name in ArchToken::names() {
        println!("{}", name);
    }
    println!("{}", ALL_ARCHES);
    Ok(())
}
