use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

const ADJECTIVES: &[&str] = &[
    "Red", "Blue", "Green", "Purple", "Orange", "Yellow", "Pink", "Cyan", "Magenta", "Lime",
    "Indigo", "Violet",
];

const ANIMALS: &[&str] = &[
    "Octopus",
    "Whale",
    "Dolphin",
    "Shark",
    "Turtle",
    "Penguin",
    "Seal",
    "Otter",
    "Jellyfish",
    "Starfish",
    "Squid",
    "Crab",
];

/// Display name of a participant. Unique by convention only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantIdentity(String);

impl ParticipantIdentity {
    pub fn new(name: impl AsRef<str>) -> Option<Self> {
        let trimmed = name.as_ref().trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    /// Random "Colour Animal" name
    pub fn generate() -> Self {
        let bits = Uuid::new_v4().as_u128();
        let adjective = ADJECTIVES[(bits % ADJECTIVES.len() as u128) as usize];
        let animal = ANIMALS[((bits >> 64) % ANIMALS.len() as u128) as usize];
        Self(format!("{adjective} {animal}"))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredIdentity {
    username: ParticipantIdentity,
}

/// Remembers the chosen display name between runs
pub struct IdentityStore {
    path: PathBuf,
    cached: Mutex<Option<ParticipantIdentity>>,
}

impl IdentityStore {
    /// Store in `data_dir`, or the platform data directory when `None`
    pub fn new(data_dir: Option<&Path>) -> Self {
        let path = match data_dir {
            Some(dir) => dir.join("identity.json"),
            None => Self::default_path(),
        };
        Self::at(path)
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cached = Self::read_from_disk(&path);
        Self {
            path,
            cached: Mutex::new(cached),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<ParticipantIdentity> {
        self.cached.lock().clone()
    }

    pub fn save(&self, identity: &ParticipantIdentity) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create identity directory")?;
        }
        let payload = serde_json::to_vec_pretty(&StoredIdentity {
            username: identity.clone(),
        })?;
        fs::write(&self.path, payload).context("Failed to write identity file")?;
        *self.cached.lock() = Some(identity.clone());
        Ok(())
    }

    /// The stored name, or a freshly generated one that is persisted
    pub fn load_or_create(&self) -> ParticipantIdentity {
        if let Some(identity) = self.load() {
            return identity;
        }
        let identity = ParticipantIdentity::generate();
        if let Err(e) = self.save(&identity) {
            warn!("Could not persist generated name: {e:#}");
        } else {
            debug!("Generated display name {identity}");
        }
        identity
    }

    fn read_from_disk(path: &Path) -> Option<ParticipantIdentity> {
        fs::read(path)
            .ok()
            .and_then(|data| serde_json::from_slice::<StoredIdentity>(&data).ok())
            .and_then(|stored| ParticipantIdentity::new(stored.username.name()))
    }

    fn default_path() -> PathBuf {
        match ProjectDirs::from("com", "tandem", "Tandem") {
            Some(dirs) => dirs.data_dir().join("identity.json"),
            None => env::temp_dir().join("tandem-identity.json"),
        }
    }
}
