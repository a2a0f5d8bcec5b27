//! # OSM ingest
//!
//! The graph builder does not care where OpenStreetMap data comes from;
//! it consumes any [`OsmSource`]. Implementations exist for protobuf
//! extracts ([`PbfSource`]), plain OSM XML ([`XmlSource`]), and in-memory
//! fixtures ([`MemorySource`]).
//!
//! Only six tags survive ingestion; everything else is discarded at this
//! boundary to keep the builder's working set small.

mod memory;
mod pbf;
mod xml;

use thiserror::Error;

pub use memory::MemorySource;
pub use pbf::PbfSource;
pub use xml::XmlSource;

#[derive(Debug, Error)]
pub enum OsmSourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PBF error: {0}")]
    Pbf(#[from] osmpbf::Error),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed OSM XML: {0}")]
    MalformedXml(String),
}

/// A raw OSM node: id plus position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OsmNode {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
}

/// The tags the routing core consumes. All other tags are dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WayTags {
    pub highway: Option<String>,
    pub surface: Option<String>,
    pub sac_scale: Option<String>,
    pub trail_visibility: Option<String>,
    pub name: Option<String>,
    pub oneway: Option<String>,
}

impl WayTags {
    /// Filters an arbitrary tag iterator down to the retained set.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut tags = Self::default();
        for (key, value) in pairs {
            let slot = match key {
                "highway" => &mut tags.highway,
                "surface" => &mut tags.surface,
                "sac_scale" => &mut tags.sac_scale,
                "trail_visibility" => &mut tags.trail_visibility,
                "name" => &mut tags.name,
                "oneway" => &mut tags.oneway,
                _ => continue,
            };
            *slot = Some(value.to_owned());
        }
        tags
    }

    /// Whether the way may only be traversed in node-ref order.
    pub fn is_oneway(&self) -> bool {
        matches!(self.oneway.as_deref(), Some("yes" | "1" | "true"))
    }
}

/// A raw OSM way: id, ordered node references, filtered tags.
#[derive(Clone, Debug, PartialEq)]
pub struct OsmWay {
    pub id: i64,
    pub node_refs: Vec<i64>,
    pub tags: WayTags,
}

/// A source of parsed OSM data.
///
/// Sources are driven twice per build, nodes first and then ways; each
/// pass streams the file anew, so implementations hold only a path (or
/// the data itself) rather than parser state.
pub trait OsmSource {
    /// Streams every node to the callback.
    ///
    /// # Errors
    ///
    /// Fails with [`OsmSourceError`] when the underlying read or parse
    /// fails.
    fn each_node(&mut self, f: &mut dyn FnMut(OsmNode)) -> Result<(), OsmSourceError>;

    /// Streams every way to the callback.
    ///
    /// # Errors
    ///
    /// Fails with [`OsmSourceError`] when the underlying read or parse
    /// fails.
    fn each_way(&mut self, f: &mut dyn FnMut(OsmWay)) -> Result<(), OsmSourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_filter_keeps_only_the_routing_tags() {
        let tags = WayTags::from_pairs([
            ("highway", "path"),
            ("surface", "gravel"),
            ("sac_scale", "mountain_hiking"),
            ("trail_visibility", "good"),
            ("name", "Zirbenweg"),
            ("oneway", "yes"),
            ("maxspeed", "30"),
            ("lit", "no"),
        ]);
        assert_eq!(tags.highway.as_deref(), Some("path"));
        assert_eq!(tags.surface.as_deref(), Some("gravel"));
        assert_eq!(tags.sac_scale.as_deref(), Some("mountain_hiking"));
        assert_eq!(tags.trail_visibility.as_deref(), Some("good"));
        assert_eq!(tags.name.as_deref(), Some("Zirbenweg"));
        assert!(tags.is_oneway());
    }

    #[test]
    fn oneway_recognizes_the_common_spellings() {
        for value in ["yes", "1", "true"] {
            let tags = WayTags::from_pairs([("oneway", value)]);
            assert!(tags.is_oneway(), "{value} should be oneway");
        }
        for value in ["no", "-1", "reversible"] {
            let tags = WayTags::from_pairs([("oneway", value)]);
            assert!(!tags.is_oneway(), "{value} should not be oneway");
        }
    }
}
