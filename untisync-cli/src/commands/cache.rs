use anyhow::Result;
use untisync_core::cache::CacheStore;

pub fn clear() -> Result<()> {
    let store = CacheStore::open()?;
    let removed = store.clear()?;

    match removed {
        0 => println!("Cache was already empty."),
        n => println!("Removed {n} cached entries."),
    }

    Ok(())
}
