//! `chainrelay fingerprint | profile | key`: offline inspection helpers.

use std::path::Path;

use anyhow::{Context, Result};

use chainrelay_core::{ConfigFingerprint, ConnectionFlags, NetworkProfile, SubscriptionKey};

fn read(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("read {}", file.display()))
}

pub fn fingerprint(file: &Path, gm_tls: bool, tx_timestamp: bool) -> Result<()> {
    let raw = read(file)?;
    let fp = ConfigFingerprint::compute(&raw, ConnectionFlags { gm_tls, tx_timestamp });
    println!("{fp}");
    Ok(())
}

pub fn profile(file: &Path) -> Result<()> {
    let raw = read(file)?;
    let profile = NetworkProfile::parse(&raw)?;
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

pub fn key(token: &str) -> Result<()> {
    let key: SubscriptionKey = token.parse()?;
    println!("Fingerprint: {}", key.fingerprint);
    println!("Channel:     {}", key.channel_id);
    println!("Chaincode:   {}", key.chaincode_id);
    println!("Event:       {}", key.event_name);
    Ok(())
}
