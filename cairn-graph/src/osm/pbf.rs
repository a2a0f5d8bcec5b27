use std::path::PathBuf;

use osmpbf::{Element, ElementReader};

use super::{OsmNode, OsmSource, OsmSourceError, OsmWay, WayTags};

/// Streams nodes and ways out of an `.osm.pbf` extract.
///
/// Each pass re-opens the file; PBF extracts interleave dense and plain
/// node encodings, and both are handled.
pub struct PbfSource {
    path: PathBuf,
}

impl PbfSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OsmSource for PbfSource {
    fn each_node(&mut self, f: &mut dyn FnMut(OsmNode)) -> Result<(), OsmSourceError> {
        let reader = ElementReader::from_path(&self.path)?;
        reader.for_each(|element| match element {
            Element::Node(node) => f(OsmNode {
                id: node.id(),
                latitude: node.lat(),
                longitude: node.lon(),
            }),
            Element::DenseNode(node) => f(OsmNode {
                id: node.id(),
                latitude: node.lat(),
                longitude: node.lon(),
            }),
            Element::Way(_) | Element::Relation(_) => {}
        })?;
        Ok(())
    }

    fn each_way(&mut self, f: &mut dyn FnMut(OsmWay)) -> Result<(), OsmSourceError> {
        let reader = ElementReader::from_path(&self.path)?;
        reader.for_each(|element| {
            if let Element::Way(way) = element {
                f(OsmWay {
                    id: way.id(),
                    node_refs: way.refs().collect(),
                    tags: WayTags::from_pairs(way.tags()),
                });
            }
        })?;
        Ok(())
    }
}
