//! Inspection and configuration of the kernel tables pinned on bpffs.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use aya::maps::{Array, HashMap as AyaHashMap, Map, MapData};
use meshsplice_common::{ConnTuple, Endpoint, DEBUG_SLOT_LEVEL, DEBUG_SLOT_REDIRECTS};

const MAP_ACTIVE_ESTAB: &str = "map_active_estab";
const MAP_PROXY: &str = "map_proxy";
const MAP_DEBUG: &str = "debug_map";

fn open(pin_dir: &Path, name: &str) -> Result<MapData> {
    let path = pin_dir.join(name);
    MapData::from_pin(&path).with_context(|| format!("open pinned map {}", path.display()))
}

fn debug_map(pin_dir: &Path) -> Result<Array<MapData, u32>> {
    Ok(Array::try_from(Map::Array(open(pin_dir, MAP_DEBUG)?))?)
}

fn proxy_map(pin_dir: &Path) -> Result<AyaHashMap<MapData, ConnTuple, ConnTuple>> {
    Ok(AyaHashMap::try_from(Map::HashMap(open(pin_dir, MAP_PROXY)?))?)
}

fn active_map(pin_dir: &Path) -> Result<AyaHashMap<MapData, Endpoint, Endpoint>> {
    Ok(AyaHashMap::try_from(Map::HashMap(open(pin_dir, MAP_ACTIVE_ESTAB)?))?)
}

pub fn set_level(pin_dir: &Path, level: u32) -> Result<()> {
    let mut debug = debug_map(pin_dir)?;
    debug.set(DEBUG_SLOT_LEVEL, level, 0)?;
    tracing::info!(level, "kernel verbosity updated");
    Ok(())
}

pub fn redirect_count(pin_dir: &Path) -> Result<u32> {
    let debug = debug_map(pin_dir)?;
    Ok(debug.get(&DEBUG_SLOT_REDIRECTS, 0)?)
}

pub fn stats(pin_dir: &Path) -> Result<()> {
    let debug = debug_map(pin_dir)?;
    let level = debug.get(&DEBUG_SLOT_LEVEL, 0)?;
    let redirects = debug.get(&DEBUG_SLOT_REDIRECTS, 0)?;
    let pairs = proxy_map(pin_dir)?.keys().filter(|k| k.is_ok()).count();
    let pending = active_map(pin_dir)?.keys().filter(|k| k.is_ok()).count();

    println!("Kernel tables ({}):", pin_dir.display());
    println!("  Verbosity: {}", level);
    println!("  Redirections: {}", redirects);
    println!("  Proxy pair entries: {}", pairs);
    println!("  Pending active establishments: {}", pending);
    Ok(())
}

pub fn pairs(pin_dir: &Path) -> Result<()> {
    let proxy = proxy_map(pin_dir)?;
    let mut count = 0usize;
    for entry in proxy.iter() {
        let (from, to) = entry?;
        println!("  {}  =>  {}", from, to);
        count += 1;
    }
    println!("{} entries.", count);
    Ok(())
}

/// Print the redirect rate until Ctrl+C.
pub async fn watch(pin_dir: &Path, interval: Duration) -> Result<()> {
    let mut last = redirect_count(pin_dir)?;
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = redirect_count(pin_dir)?;
                println!("redirections: {} (+{})", now, now.saturating_sub(last));
                last = now;
            }
            _ = &mut shutdown => {
                tracing::info!("stopping watch");
                break;
            }
        }
    }
    Ok(())
}
