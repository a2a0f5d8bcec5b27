use super::{OsmNode, OsmSource, OsmSourceError, OsmWay};

/// An in-memory OSM source, used by tests and small tooling.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    pub nodes: Vec<OsmNode>,
    pub ways: Vec<OsmWay>,
}

impl MemorySource {
    pub fn new(nodes: Vec<OsmNode>, ways: Vec<OsmWay>) -> Self {
        Self { nodes, ways }
    }
}

impl OsmSource for MemorySource {
    fn each_node(&mut self, f: &mut dyn FnMut(OsmNode)) -> Result<(), OsmSourceError> {
        for node in &self.nodes {
            f(*node);
        }
        Ok(())
    }

    fn each_way(&mut self, f: &mut dyn FnMut(OsmWay)) -> Result<(), OsmSourceError> {
        for way in &self.ways {
            f(way.clone());
        }
        Ok(())
    }
}
