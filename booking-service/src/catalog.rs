use std::collections::HashSet;
use std::path::Path;

use shared::Room;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read room catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse room catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("room {slug} has non-positive price {price}")]
    InvalidPrice { slug: String, price: i64 },
    #[error("duplicate room slug {0}")]
    DuplicateSlug(String),
}

/// Read-only room lookups. The catalog content is owned elsewhere.
pub trait RoomCatalog: Send + Sync {
    /// Matches a room's slug, or its numeric id rendered as a string.
    fn find(&self, key: &str) -> Option<Room>;
}

#[derive(Debug, Clone)]
pub struct StaticRoomCatalog {
    rooms: Vec<Room>,
}

impl StaticRoomCatalog {
    pub fn new(rooms: Vec<Room>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for room in &rooms {
            if room.price_per_night <= 0 {
                return Err(CatalogError::InvalidPrice {
                    slug: room.slug.clone(),
                    price: room.price_per_night,
                });
            }
            if !seen.insert(room.slug.as_str()) {
                return Err(CatalogError::DuplicateSlug(room.slug.clone()));
            }
        }
        Ok(Self { rooms })
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        let rooms: Vec<Room> = serde_json::from_str(&raw)?;
        Self::new(rooms)
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }
}

impl Default for StaticRoomCatalog {
    fn default() -> Self {
        let room = |id, slug: &str, name: &str, price_per_night| Room {
            id,
            slug: slug.to_string(),
            name: name.to_string(),
            price_per_night,
        };
        Self {
            rooms: vec![
                room(1, "joglo-suite", "Joglo Suite", 1_500_000),
                room(2, "limasan-room", "Limasan Room", 1_200_000),
                room(3, "kampung-house", "Kampung House", 900_000),
                room(4, "gladak-room", "Gladak Room", 750_000),
            ],
        }
    }
}

impl RoomCatalog for StaticRoomCatalog {
    fn find(&self, key: &str) -> Option<Room> {
        let key = key.trim();
        self.rooms
            .iter()
            .find(|room| room.slug == key || room.id.to_string() == key)
            .cloned()
    }
}
