use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::audio::{filters::FilterState, queue::QueueSnapshot};

/// Estado persistido de una guild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildSnapshot {
    pub guild_id: u64,
    pub volume: f32,
    #[serde(default)]
    pub queue: QueueSnapshot,
    #[serde(default)]
    pub filters: BTreeMap<String, FilterState>,
    pub saved_at: DateTime<Utc>,
}

/// Persistencia del estado por guild
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GuildStore: Send + Sync {
    async fn load_guild_state(&self, guild_id: u64) -> Result<Option<GuildSnapshot>>;
    async fn save_guild_state(&self, guild_id: u64, snapshot: GuildSnapshot) -> Result<()>;
}

/// Almacenamiento basado en archivos JSON (`<data_dir>/servers/guild_<id>.json`)
pub struct JsonStorage {
    data_dir: PathBuf,
    cache: DashMap<u64, GuildSnapshot>,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        let servers_dir = data_dir.join("servers");
        fs::create_dir_all(&servers_dir).await?;

        info!("📁 Storage inicializado en: {}", data_dir.display());

        let storage = Self {
            data_dir,
            cache: DashMap::new(),
        };
        storage.load_all().await?;

        Ok(storage)
    }

    /// Guilds con estado guardado
    pub fn list_guilds(&self) -> Vec<u64> {
        self.cache.iter().map(|entry| *entry.key()).collect()
    }

    pub async fn get_storage_stats(&self) -> Result<StorageStats> {
        let mut files = fs::read_dir(self.servers_dir()).await?;
        let mut file_count = 0;
        let mut total_size = 0;

        while let Some(entry) = files.next_entry().await? {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                file_count += 1;
                if let Ok(metadata) = entry.metadata().await {
                    total_size += metadata.len();
                }
            }
        }

        Ok(StorageStats {
            guild_files: file_count,
            cached_guilds: self.cache.len(),
            total_size_bytes: total_size,
            data_dir: self.data_dir.clone(),
        })
    }

    /// Borra el estado de las guilds en las que el bot ya no está
    pub async fn cleanup_inactive(&self, active_guilds: &[u64]) -> Result<usize> {
        let mut removed = 0;

        for guild_id in self.list_guilds() {
            if active_guilds.contains(&guild_id) {
                continue;
            }
            match fs::remove_file(self.guild_file_path(guild_id)).await {
                Ok(()) => {
                    self.cache.remove(&guild_id);
                    removed += 1;
                    info!("🗑️ Estado eliminado para guild inactiva: {}", guild_id);
                }
                Err(e) => error!("Error eliminando estado de guild {}: {}", guild_id, e),
            }
        }

        Ok(removed)
    }

    async fn read_snapshot(&self, guild_id: u64) -> Result<GuildSnapshot> {
        let content = fs::read_to_string(self.guild_file_path(guild_id)).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn load_all(&self) -> Result<()> {
        let mut files = fs::read_dir(self.servers_dir()).await?;
        let mut loaded_count = 0;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }

            let guild_id = path
                .file_stem()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_prefix("guild_"))
                .and_then(|id| id.parse::<u64>().ok());

            if let Some(guild_id) = guild_id {
                match self.read_snapshot(guild_id).await {
                    Ok(snapshot) => {
                        self.cache.insert(guild_id, snapshot);
                        loaded_count += 1;
                    }
                    Err(e) => warn!("Error cargando estado para guild {}: {}", guild_id, e),
                }
            }
        }

        if loaded_count > 0 {
            info!("📂 Cargados {} estados de guild", loaded_count);
        }
        Ok(())
    }

    fn servers_dir(&self) -> PathBuf {
        self.data_dir.join("servers")
    }

    fn guild_file_path(&self, guild_id: u64) -> PathBuf {
        self.servers_dir().join(format!("guild_{}.json", guild_id))
    }
}

#[async_trait]
impl GuildStore for JsonStorage {
    async fn load_guild_state(&self, guild_id: u64) -> Result<Option<GuildSnapshot>> {
        if let Some(snapshot) = self.cache.get(&guild_id) {
            return Ok(Some(snapshot.clone()));
        }

        let path = self.guild_file_path(guild_id);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }

        let snapshot = self.read_snapshot(guild_id).await?;
        self.cache.insert(guild_id, snapshot.clone());
        Ok(Some(snapshot))
    }

    async fn save_guild_state(&self, guild_id: u64, snapshot: GuildSnapshot) -> Result<()> {
        let content = serde_json::to_string_pretty(&snapshot)?;
        fs::write(self.guild_file_path(guild_id), content).await?;
        self.cache.insert(guild_id, snapshot);

        debug!("💾 Estado guardado para guild {}", guild_id);
        Ok(())
    }
}

#[derive(Debug)]
pub struct StorageStats {
    pub guild_files: usize,
    pub cached_guilds: usize,
    pub total_size_bytes: u64,
    pub data_dir: PathBuf,
}

impl std::fmt::Display for StorageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "📊 Storage: {} ({} archivos, {} en memoria, {:.2} KB)",
            self.data_dir.display(),
            self.guild_files,
            self.cached_guilds,
            self.total_size_bytes as f64 / 1024.0
        )
    }
}
