mod asset_index;

pub use asset_index::{fetch_index, game_assets_dir, materialize_legacy, AssetIndex, AssetObject};
