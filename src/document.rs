//! Serde model of an exported Tabletop Simulator module.
//!
//! Only the fields that can carry asset URLs (plus the module metadata) are
//! modelled; everything else in the export is ignored on decode. Exports
//! routinely contain `null` where a list or map is expected, so every
//! collection field decodes `null` as empty.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

/// Decodes a missing or `null` field as the type's default value.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Top-level module export (`<workshop id>.json`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModuleDocument {
    /// Display name of the module.
    #[serde(default, deserialize_with = "nullable")]
    pub save_name: String,
    /// Export timestamp, see [`crate::pipeline::parse_export_date`].
    #[serde(default, deserialize_with = "nullable")]
    pub date: String,
    /// Module version; empty when the export has none.
    #[serde(default, deserialize_with = "nullable")]
    pub version_number: String,
    /// Custom table surface image.
    #[serde(rename = "TableURL", default, deserialize_with = "nullable")]
    pub table_url: String,
    /// Custom sky box image.
    #[serde(rename = "SkyURL", default, deserialize_with = "nullable")]
    pub sky_url: String,
    #[serde(rename = "CustomUIAssets", default, deserialize_with = "nullable")]
    pub custom_ui_assets: Vec<CustomUiAsset>,
    #[serde(default)]
    pub music_player: Option<MusicPlayer>,
    /// Decals available in the decal palette (not attached to any object).
    #[serde(default, deserialize_with = "nullable")]
    pub decal_pallet: Vec<CustomDecal>,
    /// Root scene objects.
    #[serde(rename = "ObjectStates", default, deserialize_with = "nullable")]
    pub objects: Vec<GameObject>,
}

/// One node of the scene graph.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameObject {
    #[serde(default, deserialize_with = "nullable")]
    pub custom_deck: BTreeMap<String, CustomCard>,
    #[serde(default, deserialize_with = "nullable")]
    pub attached_decals: Vec<AttachedDecal>,
    #[serde(default)]
    pub custom_assetbundle: Option<CustomAssetbundle>,
    #[serde(rename = "CustomUIAssets", default, deserialize_with = "nullable")]
    pub custom_ui_assets: Vec<CustomUiAsset>,
    #[serde(default)]
    pub custom_mesh: Option<CustomMesh>,
    #[serde(default)]
    pub custom_image: Option<CustomImage>,
    #[serde(rename = "CustomPDF", default)]
    pub custom_pdf: Option<CustomPdf>,

    /// Alternate states of this object, keyed by state index.
    #[serde(default, deserialize_with = "nullable")]
    pub states: BTreeMap<String, GameObject>,
    /// Objects held inside this one (bags, decks).
    #[serde(default, deserialize_with = "nullable")]
    pub contained_objects: Vec<GameObject>,
    /// Objects attached to this one.
    #[serde(default, deserialize_with = "nullable")]
    pub child_objects: Vec<GameObject>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomUiAsset {
    #[serde(rename = "Name", default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(rename = "URL", default, deserialize_with = "nullable")]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomAssetbundle {
    #[serde(rename = "AssetbundleURL", default, deserialize_with = "nullable")]
    pub assetbundle_url: String,
    #[serde(rename = "AssetbundleSecondaryURL", default, deserialize_with = "nullable")]
    pub assetbundle_secondary_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomMesh {
    #[serde(rename = "MeshURL", default, deserialize_with = "nullable")]
    pub mesh_url: String,
    #[serde(rename = "DiffuseURL", default, deserialize_with = "nullable")]
    pub diffuse_url: String,
    #[serde(rename = "NormalURL", default, deserialize_with = "nullable")]
    pub normal_url: String,
    #[serde(rename = "ColliderURL", default, deserialize_with = "nullable")]
    pub collider_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomImage {
    #[serde(rename = "ImageURL", default, deserialize_with = "nullable")]
    pub image_url: String,
    #[serde(rename = "ImageSecondaryURL", default, deserialize_with = "nullable")]
    pub image_secondary_url: String,
}

/// One sheet of a custom card deck.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomCard {
    #[serde(rename = "FaceURL", default, deserialize_with = "nullable")]
    pub face_url: String,
    #[serde(rename = "BackURL", default, deserialize_with = "nullable")]
    pub back_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachedDecal {
    #[serde(rename = "CustomDecal", default)]
    pub custom_decal: Option<CustomDecal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomDecal {
    #[serde(rename = "Name", default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(rename = "ImageURL", default, deserialize_with = "nullable")]
    pub image_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomPdf {
    #[serde(rename = "PDFUrl", default, deserialize_with = "nullable")]
    pub pdf_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MusicPlayer {
    /// Each entry maps labels (title, URL) to strings; only URL-shaped values matter.
    #[serde(rename = "AudioLibrary", default, deserialize_with = "nullable")]
    pub audio_library: Vec<BTreeMap<String, String>>,
}
