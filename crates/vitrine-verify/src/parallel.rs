use std::collections::BTreeMap;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;

use crate::digest::hash_asset;
use crate::error::{Result, VerifyError};

/// Hash every asset on the blocking pool.
///
/// Digests complete in any order but are collected into a path-keyed
/// `BTreeMap`, so callers never observe completion order. The token is
/// checked before each task is spawned and after each one completes; on
/// cancellation nothing partial is returned.
pub async fn hash_assets(
    assets: Vec<(String, Bytes)>,
    cancel: &CancellationToken,
) -> Result<BTreeMap<String, String>> {
    let mut tasks = FuturesUnordered::new();

    for (path, bytes) in assets {
        if cancel.is_cancelled() {
            return Err(VerifyError::Cancelled);
        }
        tasks.push(tokio::task::spawn_blocking(move || {
            let digest = hash_asset(&bytes);
            (path, digest)
        }));
    }

    let mut digests = BTreeMap::new();
    while let Some(joined) = tasks.next().await {
        if cancel.is_cancelled() {
            return Err(VerifyError::Cancelled);
        }
        let (path, digest) = joined.map_err(|e| VerifyError::TaskFailed(e.to_string()))?;
        tracing::debug!(%path, %digest, "asset hashed");
        digests.insert(path, digest);
    }

    Ok(digests)
}
