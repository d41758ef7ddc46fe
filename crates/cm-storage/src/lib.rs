use anyhow::Result;
use async_trait::async_trait;
use cm_api_types::{AssetRecord, NftCollectionRecord, StakingRewardRecord};
use rocksdb::{DB, IteratorMode, Options};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Chain-keyed persistence for the records downstream consumers display:
/// assets, NFT collections and staking-reward snapshots.
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn upsert_asset(&self, record: AssetRecord) -> Result<()>;
    async fn get_all_assets(&self) -> Result<Vec<AssetRecord>>;
    /// Removes every asset whose slug matches one of `slugs`, ignoring case.
    async fn remove_assets(&self, slugs: &[String]) -> Result<()>;

    async fn upsert_nft_collection(&self, record: NftCollectionRecord) -> Result<()>;
    /// With a chain list, returns only collections on those chains
    /// (case-insensitive); without one, returns everything.
    async fn get_nft_collections(&self, chains: Option<&[String]>) -> Result<Vec<NftCollectionRecord>>;

    async fn upsert_staking_reward(&self, record: StakingRewardRecord) -> Result<()>;
    async fn get_staking_reward(&self, chain: &str, address: &str) -> Result<Option<StakingRewardRecord>>;
}

fn matches_ignore_case(haystack: &[String], needle: &str) -> bool {
    haystack.iter().any(|entry| entry.eq_ignore_ascii_case(needle))
}

#[derive(Default)]
pub struct InMemoryStore {
    assets: RwLock<HashMap<String, AssetRecord>>,
    nft_collections: RwLock<HashMap<String, NftCollectionRecord>>,
    staking_rewards: RwLock<HashMap<String, StakingRewardRecord>>,
}

fn nft_collection_key(chain: &str, collection_id: &str) -> String {
    format!("{chain}:{collection_id}")
}

fn staking_reward_key(chain: &str, address: &str) -> String {
    format!("{chain}:{address}")
}

#[async_trait]
impl WalletStore for InMemoryStore {
    async fn upsert_asset(&self, record: AssetRecord) -> Result<()> {
        let mut guard = self.assets.write().await;
        guard.insert(record.slug.clone(), record);
        Ok(())
    }

    async fn get_all_assets(&self) -> Result<Vec<AssetRecord>> {
        let guard = self.assets.read().await;
        Ok(guard.values().cloned().collect())
    }

    async fn remove_assets(&self, slugs: &[String]) -> Result<()> {
        let mut guard = self.assets.write().await;
        guard.retain(|slug, _| !matches_ignore_case(slugs, slug));
        Ok(())
    }

    async fn upsert_nft_collection(&self, record: NftCollectionRecord) -> Result<()> {
        let mut guard = self.nft_collections.write().await;
        guard.insert(
            nft_collection_key(&record.chain, &record.collection_id),
            record,
        );
        Ok(())
    }

    async fn get_nft_collections(&self, chains: Option<&[String]>) -> Result<Vec<NftCollectionRecord>> {
        let guard = self.nft_collections.read().await;
        Ok(guard
            .values()
            .filter(|record| match chains {
                Some(chains) if !chains.is_empty() => matches_ignore_case(chains, &record.chain),
                _ => true,
            })
            .cloned()
            .collect())
    }

    async fn upsert_staking_reward(&self, record: StakingRewardRecord) -> Result<()> {
        let mut guard = self.staking_rewards.write().await;
        guard.insert(staking_reward_key(&record.chain, &record.address), record);
        Ok(())
    }

    async fn get_staking_reward(&self, chain: &str, address: &str) -> Result<Option<StakingRewardRecord>> {
        let guard = self.staking_rewards.read().await;
        Ok(guard.get(&staking_reward_key(chain, address)).cloned())
    }
}

pub struct RocksDbStore {
    db: Arc<DB>,
}

const ASSET_PREFIX: &str = "asset:";
const NFT_COLLECTION_PREFIX: &str = "nft-collection:";
const STAKING_REWARD_PREFIX: &str = "staking-reward:";

impl RocksDbStore {
    pub fn open_default(path: &str) -> Result<Self> {
        let mut options = Options::default();
        options.create_if_missing(true);
        let db = DB::open(&options, path)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn key_for_asset(slug: &str) -> String {
        format!("{ASSET_PREFIX}{slug}")
    }

    fn key_for_nft_collection(chain: &str, collection_id: &str) -> String {
        format!("{NFT_COLLECTION_PREFIX}{chain}:{collection_id}")
    }

    fn key_for_staking_reward(chain: &str, address: &str) -> String {
        format!("{STAKING_REWARD_PREFIX}{chain}:{address}")
    }

    fn scan_prefix<T: serde::de::DeserializeOwned>(&self, prefix: &str) -> Result<Vec<(String, T)>> {
        let mut records = Vec::new();

        for entry in self.db.iterator(IteratorMode::Start) {
            let (key, value) = entry?;
            let key = String::from_utf8_lossy(&key).into_owned();
            if !key.starts_with(prefix) {
                continue;
            }

            records.push((key, serde_json::from_slice::<T>(&value)?));
        }

        Ok(records)
    }
}

#[async_trait]
impl WalletStore for RocksDbStore {
    async fn upsert_asset(&self, record: AssetRecord) -> Result<()> {
        let key = Self::key_for_asset(&record.slug);
        let value = serde_json::to_vec(&record)?;
        self.db.put(key.as_bytes(), value)?;
        Ok(())
    }

    async fn get_all_assets(&self) -> Result<Vec<AssetRecord>> {
        Ok(self
            .scan_prefix::<AssetRecord>(ASSET_PREFIX)?
            .into_iter()
            .map(|(_, record)| record)
            .collect())
    }

    async fn remove_assets(&self, slugs: &[String]) -> Result<()> {
        for (key, record) in self.scan_prefix::<AssetRecord>(ASSET_PREFIX)? {
            if matches_ignore_case(slugs, &record.slug) {
                self.db.delete(key.as_bytes())?;
            }
        }
        Ok(())
    }

    async fn upsert_nft_collection(&self, record: NftCollectionRecord) -> Result<()> {
        let key = Self::key_for_nft_collection(&record.chain, &record.collection_id);
        let value = serde_json::to_vec(&record)?;
        self.db.put(key.as_bytes(), value)?;
        Ok(())
    }

    async fn get_nft_collections(&self, chains: Option<&[String]>) -> Result<Vec<NftCollectionRecord>> {
        let records = self.scan_prefix::<NftCollectionRecord>(NFT_COLLECTION_PREFIX)?;

        Ok(records
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| match chains {
                Some(chains) if !chains.is_empty() => matches_ignore_case(chains, &record.chain),
                _ => true,
            })
            .collect())
    }

    async fn upsert_staking_reward(&self, record: StakingRewardRecord) -> Result<()> {
        let key = Self::key_for_staking_reward(&record.chain, &record.address);
        let value = serde_json::to_vec(&record)?;
        self.db.put(key.as_bytes(), value)?;
        Ok(())
    }

    async fn get_staking_reward(&self, chain: &str, address: &str) -> Result<Option<StakingRewardRecord>> {
        let key = Self::key_for_staking_reward(chain, address);
        let value = self.db.get(key.as_bytes())?;
        match value {
            Some(raw) => Ok(Some(serde_json::from_slice::<StakingRewardRecord>(&raw)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cm_api_types::AssetType;

    fn asset(slug: &str, chain: &str) -> AssetRecord {
        AssetRecord {
            slug: slug.to_owned(),
            chain: chain.to_owned(),
            symbol: slug.split('-').last().unwrap_or_default().to_uppercase(),
            decimals: 12,
            asset_type: AssetType::Native,
            min_amount: Some("1000000000".to_owned()),
        }
    }

    fn collection(chain: &str, collection_id: &str) -> NftCollectionRecord {
        NftCollectionRecord {
            chain: chain.to_owned(),
            collection_id: collection_id.to_owned(),
            collection_name: Some(format!("{collection_id} collection")),
            image: None,
        }
    }

    fn reward(chain: &str, address: &str, latest: &str) -> StakingRewardRecord {
        StakingRewardRecord {
            chain: chain.to_owned(),
            address: address.to_owned(),
            latest_reward: latest.to_owned(),
            total_reward: "100".to_owned(),
            total_slash: "0".to_owned(),
            unclaimed_reward: None,
        }
    }

    async fn asset_roundtrip(store: &dyn WalletStore) -> Result<()> {
        store.upsert_asset(asset("polkadot-native-dot", "polkadot")).await?;
        store.upsert_asset(asset("kusama-native-ksm", "kusama")).await?;

        let all = store.get_all_assets().await?;
        assert_eq!(all.len(), 2);

        // removal ignores case
        store
            .remove_assets(&["Polkadot-NATIVE-dot".to_owned()])
            .await?;
        let all = store.get_all_assets().await?;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].slug, "kusama-native-ksm");

        Ok(())
    }

    async fn nft_filtering(store: &dyn WalletStore) -> Result<()> {
        store.upsert_nft_collection(collection("acala", "acala-waifus")).await?;
        store.upsert_nft_collection(collection("karura", "karura-birds")).await?;
        store.upsert_nft_collection(collection("astar", "astar-cats")).await?;

        let all = store.get_nft_collections(None).await?;
        assert_eq!(all.len(), 3);

        let filtered = store
            .get_nft_collections(Some(&["Acala".to_owned(), "ASTAR".to_owned()]))
            .await?;
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|record| record.chain != "karura"));

        Ok(())
    }

    async fn staking_reward_overwrite(store: &dyn WalletStore) -> Result<()> {
        store.upsert_staking_reward(reward("polkadot", "15oF4…", "1")).await?;
        store.upsert_staking_reward(reward("polkadot", "15oF4…", "7")).await?;

        let loaded = store
            .get_staking_reward("polkadot", "15oF4…")
            .await?
            .expect("reward should exist");
        assert_eq!(loaded.latest_reward, "7");

        assert!(store.get_staking_reward("kusama", "15oF4…").await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn in_memory_store_roundtrips() -> Result<()> {
        let store = InMemoryStore::default();
        asset_roundtrip(&store).await?;
        nft_filtering(&store).await?;
        staking_reward_overwrite(&store).await
    }

    #[tokio::test]
    async fn rocksdb_store_roundtrips() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = RocksDbStore::open_default(&dir.path().join("store").to_string_lossy())?;
        asset_roundtrip(&store).await?;
        nft_filtering(&store).await?;
        staking_reward_overwrite(&store).await
    }
}
