use anyhow::Result;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete game configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GameConfig {
    pub window: WindowConfig,
    pub physics: PhysicsConfig,
    pub player: PlayerConfig,
    pub weapon: WeaponConfig,
    pub npc: NpcConfig,
    /// Assets to load before the first frame. Empty is fine: procedural
    /// fallbacks stand in for anything not authored yet.
    pub assets: Vec<AssetEntry>,
}

impl GameConfig {
    /// Load configuration from JSON file
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: GameConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file with pretty formatting
    pub fn save(&self, path: &str) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_default(path: &str) -> Self {
        Self::load(path).unwrap_or_else(|_| {
            let config = Self::default();
            let _ = config.save(path);
            config
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Ironsight".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicsConfig {
    #[serde(with = "vec3_serde")]
    pub gravity: Vec3,

    /// Sub-step budget for one stepped frame.
    pub max_substeps: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            max_substeps: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(with = "vec3_serde")]
    pub spawn: Vec3,

    pub move_speed: f32,
    pub jump_speed: f32,
    pub mouse_sensitivity: f32,

    /// Eye offset above the capsule center.
    pub eye_height: f32,
    pub max_health: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            spawn: Vec3::new(0.0, 0.9, 8.0),
            move_speed: 5.0,
            jump_speed: 6.0,
            mouse_sensitivity: 0.002,
            eye_height: 0.5,
            max_health: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeaponConfig {
    pub damage: f32,
    pub range: f32,
    /// Seconds between shots while the trigger is held.
    pub fire_interval: f32,
    pub clip_size: u32,
    pub reserve_ammo: u32,
}

impl Default for WeaponConfig {
    fn default() -> Self {
        Self {
            damage: 10.0,
            range: 100.0,
            fire_interval: 0.1,
            clip_size: 30,
            reserve_ammo: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpcConfig {
    pub health: f32,
    pub move_speed: f32,
    pub aggro_radius: f32,
    pub attack_range: f32,
    pub attack_damage: f32,
    pub attack_cooldown: f32,

    /// One NPC entity spawns per point.
    pub spawn_points: Vec<[f32; 3]>,
}

impl Default for NpcConfig {
    fn default() -> Self {
        Self {
            health: 100.0,
            move_speed: 2.5,
            aggro_radius: 16.0,
            attack_range: 1.6,
            attack_damage: 10.0,
            attack_cooldown: 1.0,
            spawn_points: vec![[-3.0, 0.9, -8.0], [4.0, 0.9, -14.0]],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetEntry {
    pub name: String,
    pub path: String,
    pub kind: AssetKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum AssetKind {
    Mesh,
    Blob,
}

/// Custom serialization for Vec3
mod vec3_serde {
    use glam::Vec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Vec3Data {
        x: f32,
        y: f32,
        z: f32,
    }

    pub fn serialize<S>(vec: &Vec3, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Vec3Data {
            x: vec.x,
            y: vec.y,
            z: vec.z,
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec3, D::Error>
    where
        D: Deserializer<'de>,
    {
        let data = Vec3Data::deserialize(deserializer)?;
        Ok(Vec3::new(data.x, data.y, data.z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GameConfig::default();
        assert_eq!(config.physics.max_substeps, 10);
        assert_eq!(config.weapon.clip_size, 30);
        assert!(config.assets.is_empty());
    }

    #[test]
    fn test_save_load() {
        let config = GameConfig::default();
        let path = std::env::temp_dir().join("ironsight_config_test.json");
        let path = path.to_str().unwrap();

        config.save(path).unwrap();
        let loaded = GameConfig::load(path).unwrap();

        assert_eq!(loaded.physics.gravity, config.physics.gravity);
        assert_eq!(loaded.player.move_speed, config.player.move_speed);
        assert_eq!(loaded.npc.spawn_points, config.npc.spawn_points);

        let _ = fs::remove_file(path);
    }
}
