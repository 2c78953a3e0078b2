//! Asset-graph scanner.
//!
//! Walks a decoded [`ModuleDocument`] depth-first and returns every asset URL
//! it references as a [`FileSet`]. Each recursive call builds and returns its
//! own set which the caller merges, so concurrent scans never share state.
//! Child lists are visited in a fixed order (contained objects, states by
//! key, child objects) so results are reproducible.

use url::Url;

use crate::document::{GameObject, ModuleDocument};
use crate::fileset::{AssetCategory, FileSet};

/// Scans a whole module document.
#[must_use]
pub fn scan_document(document: &ModuleDocument) -> FileSet {
    let mut files = FileSet::new();

    files.add(AssetCategory::Image, &document.table_url);
    files.add(AssetCategory::Image, &document.sky_url);

    if let Some(player) = &document.music_player {
        for entry in &player.audio_library {
            for value in entry.values() {
                if is_web_url(value) {
                    files.add(AssetCategory::Audio, value);
                }
            }
        }
    }

    for asset in &document.custom_ui_assets {
        files.add(AssetCategory::Image, &asset.url);
    }

    for decal in &document.decal_pallet {
        files.add(AssetCategory::Image, &decal.image_url);
    }

    for object in &document.objects {
        files.merge(scan_object(object));
    }

    files
}

/// Scans one node and all of its descendants.
#[must_use]
pub fn scan_object(object: &GameObject) -> FileSet {
    let mut files = own_assets(object);

    let children = object
        .contained_objects
        .iter()
        .chain(object.states.values())
        .chain(object.child_objects.iter());
    for child in children {
        files.merge(scan_object(child));
    }

    files
}

/// Assets referenced directly by `object`, ignoring descendants.
fn own_assets(object: &GameObject) -> FileSet {
    let mut files = FileSet::new();

    if let Some(bundle) = &object.custom_assetbundle {
        files.add(AssetCategory::Bundle, &bundle.assetbundle_url);
        files.add(AssetCategory::Bundle, &bundle.assetbundle_secondary_url);
    }

    if let Some(image) = &object.custom_image {
        files.add(AssetCategory::Image, &image.image_url);
        files.add(AssetCategory::Image, &image.image_secondary_url);
    }

    if let Some(mesh) = &object.custom_mesh {
        files.add(AssetCategory::Image, &mesh.diffuse_url);
        files.add(AssetCategory::Image, &mesh.normal_url);
        files.add(AssetCategory::Model, &mesh.mesh_url);
        files.add(AssetCategory::Model, &mesh.collider_url);
    }

    for card in object.custom_deck.values() {
        files.add(AssetCategory::Image, &card.face_url);
        files.add(AssetCategory::Image, &card.back_url);
    }

    for asset in &object.custom_ui_assets {
        files.add(AssetCategory::Image, &asset.url);
    }

    if let Some(pdf) = &object.custom_pdf {
        files.add(AssetCategory::Pdf, &pdf.pdf_url);
    }

    for decal in object.attached_decals.iter().filter_map(|d| d.custom_decal.as_ref()) {
        files.add(AssetCategory::Image, &decal.image_url);
    }

    files
}

/// Audio library entries mix titles and URLs; only http(s) URLs are assets.
fn is_web_url(value: &str) -> bool {
    Url::parse(value).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn decode(json: &str) -> ModuleDocument {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_scan_root_image_and_nested_deck() {
        let doc = decode(
            r#"{
                "TableURL": "http://example.com/table.png",
                "ObjectStates": [{
                    "ContainedObjects": [{
                        "CustomDeck": {
                            "1": {"FaceURL": "http://example.com/f1.png", "BackURL": "http://example.com/b1.png"},
                            "2": {"FaceURL": "http://example.com/f2.png", "BackURL": "http://example.com/b2.png"}
                        }
                    }]
                }]
            }"#,
        );
        let files = scan_document(&doc);
        assert_eq!(files.count(AssetCategory::Image), 5);
        assert_eq!(files.len(), 5);
    }

    #[test]
    fn test_scan_deduplicates_repeated_deck_urls() {
        let doc = decode(
            r#"{
                "TableURL": "http://example.com/table.png",
                "ObjectStates": [{
                    "CustomDeck": {
                        "1": {"FaceURL": "http://example.com/f.png", "BackURL": "http://example.com/back.png"},
                        "2": {"FaceURL": "http://example.com/g.png", "BackURL": "http://example.com/back.png"}
                    }
                }]
            }"#,
        );
        let files = scan_document(&doc);
        assert_eq!(files.count(AssetCategory::Image), 4);
    }

    #[test]
    fn test_scan_categorizes_every_reference_kind() {
        let doc = decode(
            r#"{
                "SkyURL": "http://example.com/sky.jpg",
                "CustomUIAssets": [{"Name": "logo", "URL": "http://example.com/ui.png"}],
                "MusicPlayer": {"AudioLibrary": [
                    {"Item1": "http://example.com/song.mp3", "Item2": "My Song"},
                    {"Item1": "ftp://example.com/nope.mp3", "Item2": "Other"}
                ]},
                "ObjectStates": [{
                    "CustomAssetbundle": {"AssetbundleURL": "http://example.com/a.bundle", "AssetbundleSecondaryURL": ""},
                    "CustomMesh": {"MeshURL": "http://example.com/m.obj", "DiffuseURL": "http://example.com/d.png",
                                   "NormalURL": "", "ColliderURL": "http://example.com/c.obj"},
                    "CustomPDF": {"PDFUrl": "http://example.com/rules.pdf"},
                    "AttachedDecals": [{"CustomDecal": {"Name": "x", "ImageURL": "http://example.com/decal.png"}}]
                }]
            }"#,
        );
        let files = scan_document(&doc);
        assert_eq!(files.count(AssetCategory::Bundle), 1);
        assert_eq!(files.count(AssetCategory::Model), 2);
        assert_eq!(files.count(AssetCategory::Image), 4);
        assert_eq!(files.count(AssetCategory::Pdf), 1);
        assert_eq!(files.count(AssetCategory::Audio), 1);
        assert!(files.contains("http://example.com/song.mp3"));
        assert!(!files.contains("ftp://example.com/nope.mp3"));
    }

    #[test]
    fn test_scan_descends_states_and_child_objects() {
        let doc = decode(
            r#"{
                "ObjectStates": [{
                    "States": {
                        "2": {"ChildObjects": [{"CustomImage": {"ImageURL": "deep.example.com/x.png"}}]}
                    }
                }]
            }"#,
        );
        let files = scan_document(&doc);
        assert!(files.contains("http://deep.example.com/x.png"));
    }

    #[test]
    fn test_scan_handles_deep_nesting() {
        let mut node = GameObject::default();
        node.custom_image = Some(crate::document::CustomImage {
            image_url: "http://example.com/leaf.png".to_string(),
            image_secondary_url: String::new(),
        });
        for _ in 0..200 {
            node = GameObject {
                contained_objects: vec![node],
                ..GameObject::default()
            };
        }
        let files = scan_object(&node);
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_scan_is_deterministic() {
        let json = r#"{
            "ObjectStates": [
                {"CustomImage": {"ImageURL": "http://b"}},
                {"CustomImage": {"ImageURL": "http://a"}}
            ]
        }"#;
        let first = scan_document(&decode(json));
        let second = scan_document(&decode(json));
        assert_eq!(first, second);
        assert_eq!(first.sorted_entries()[0].url(), "http://a");
    }
}
