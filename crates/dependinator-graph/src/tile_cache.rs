//! Cache of rendered tiles keyed by zoom level and tile coordinates.
//!
//! Rendering itself is done by the host through [`TileRenderer`]. The cache
//! only quantizes view requests into tile keys and drops every tile as soon
//! as the model generation moves on.

use crate::model_db::{ModelDb, SharedModel};
use crate::settings::TileSettings;
use dependinator_core::Rect;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub level: i32,
    pub x: i64,
    pub y: i64,
}

pub trait TileRenderer {
    type Tile;

    /// Render the part of the model covered by `area`, given in root
    /// coordinates scaled to the key's level.
    fn render_tile(&mut self, db: &ModelDb, key: &TileKey, area: Rect) -> Self::Tile;
}

pub struct TileCache<R: TileRenderer> {
    renderer: R,
    settings: TileSettings,
    tiles: HashMap<TileKey, Arc<R::Tile>>,
    generation: Option<u64>,
}

impl<R: TileRenderer> TileCache<R> {
    pub fn new(renderer: R, settings: TileSettings) -> Self {
        Self {
            renderer,
            settings,
            tiles: HashMap::new(),
            generation: None,
        }
    }

    /// Zoom level containing `zoom`; level 0 spans zoom `[1, factor)`.
    pub fn level_for_zoom(&self, zoom: f64) -> i32 {
        let zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { 1.0 };
        let factor = self.level_factor();
        (zoom.ln() / factor.ln()).floor() as i32
    }

    /// Key of the tile that serves `view` at `zoom`.
    pub fn tile_key(&self, view: Rect, zoom: f64) -> TileKey {
        let level = self.level_for_zoom(zoom);
        let scale = self.level_factor().powi(level);
        let tile_size = self.tile_size();
        TileKey {
            level,
            x: (view.x / scale / tile_size).round() as i64,
            y: (view.y / scale / tile_size).round() as i64,
        }
    }

    /// The area a tile covers, in root coordinates.
    pub fn tile_area(&self, key: &TileKey) -> Rect {
        let scale = self.level_factor().powi(key.level);
        let size = self.tile_size() * scale;
        Rect::new(key.x as f64 * size, key.y as f64 * size, size, size)
    }

    /// Cached tile for the view, rendered on a miss.
    pub fn get_tile(&mut self, model: &SharedModel, view: Rect, zoom: f64) -> Arc<R::Tile> {
        let key = self.tile_key(view, zoom);
        let area = self.tile_area(&key);
        let db = model.lock();

        if self.generation != Some(db.generation()) {
            if !self.tiles.is_empty() {
                trace!(tiles = self.tiles.len(), "Model changed, dropping cached tiles");
            }
            self.tiles.clear();
            self.generation = Some(db.generation());
        }

        if let Some(tile) = self.tiles.get(&key) {
            return Arc::clone(tile);
        }
        let tile = Arc::new(self.renderer.render_tile(&db, &key, area));
        self.tiles.insert(key, Arc::clone(&tile));
        tile
    }

    pub fn clear(&mut self) {
        self.tiles.clear();
        self.generation = None;
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    fn level_factor(&self) -> f64 {
        if self.settings.level_factor > 1.0 {
            self.settings.level_factor
        } else {
            TileSettings::default().level_factor
        }
    }

    fn tile_size(&self) -> f64 {
        if self.settings.tile_size > 0.0 {
            self.settings.tile_size
        } else {
            TileSettings::default().tile_size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dependinator_core::{NodeKind, ParsedNode};

    /// Renders the names of nodes directly below the root that overlap the tile.
    #[derive(Default)]
    struct NameRenderer {
        renders: usize,
    }

    impl TileRenderer for NameRenderer {
        type Tile = Vec<String>;

        fn render_tile(&mut self, db: &ModelDb, _key: &TileKey, area: Rect) -> Vec<String> {
            self.renders += 1;
            let mut names: Vec<_> = db
                .root()
                .children
                .iter()
                .map(|id| &db[id])
                .filter(|node| node.boundary.intersects(&area))
                .map(|node| node.name.clone())
                .collect();
            names.sort();
            names
        }
    }

    fn cache() -> TileCache<NameRenderer> {
        TileCache::new(NameRenderer::default(), TileSettings::default())
    }

    #[test]
    fn test_levels_follow_factor() {
        let cache = cache();
        assert_eq!(cache.level_for_zoom(1.0), 0);
        assert_eq!(cache.level_for_zoom(6.9), 0);
        assert_eq!(cache.level_for_zoom(7.5), 1);
        assert_eq!(cache.level_for_zoom(0.5), -1);
        assert_eq!(cache.level_for_zoom(0.0), 0);
    }

    #[test]
    fn test_tile_key_quantizes_position() {
        let cache = cache();
        let key = cache.tile_key(Rect::new(1000.0, -300.0, 800.0, 600.0), 1.0);
        assert_eq!(key, TileKey { level: 0, x: 2, y: -1 });

        let key = cache.tile_key(Rect::new(7168.0, 0.0, 800.0, 600.0), 8.0);
        assert_eq!(key, TileKey { level: 1, x: 2, y: 0 });
    }

    #[test]
    fn test_tiles_are_cached_until_model_changes() {
        let model = SharedModel::default();
        model.with(|db| {
            db.add_or_update_node(&ParsedNode::new("A", NodeKind::Type));
        });
        let mut cache = cache();
        let view = Rect::new(0.0, 0.0, 400.0, 400.0);

        let first = cache.get_tile(&model, view, 1.0);
        let second = cache.get_tile(&model, view, 1.0);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, vec!["A".to_string()]);
        assert_eq!(cache.renderer().renders, 1);

        model.with(|db| {
            db.add_or_update_node(&ParsedNode::new("B", NodeKind::Type));
        });
        let third = cache.get_tile(&model, view, 1.0);
        assert_eq!(cache.renderer().renders, 2);
        assert_eq!(*third, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_user_edit_invalidates_tiles() {
        let model = SharedModel::default();
        let id = model.with(|db| db.add_or_update_node(&ParsedNode::new("A", NodeKind::Type)));
        let mut cache = cache();
        let view = Rect::new(0.0, 0.0, 400.0, 400.0);
        cache.get_tile(&model, view, 1.0);

        model.with(|db| db.set_node_color(&id, Some("red".to_string()), None));
        cache.get_tile(&model, view, 1.0);
        assert_eq!(cache.renderer().renders, 2);
    }
}
