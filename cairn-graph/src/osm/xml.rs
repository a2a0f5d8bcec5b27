use std::path::PathBuf;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::{OsmNode, OsmSource, OsmSourceError, OsmWay, WayTags};

/// Streams nodes and ways out of a plain `.osm` XML file.
pub struct XmlSource {
    path: PathBuf,
}

impl XmlSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn attr_value(element: &BytesStart, name: &str) -> Result<Option<String>, OsmSourceError> {
    let Some(attr) = element
        .try_get_attribute(name)
        .map_err(|e| OsmSourceError::MalformedXml(e.to_string()))?
    else {
        return Ok(None);
    };
    let value = attr
        .unescape_value()
        .map_err(|e| OsmSourceError::MalformedXml(e.to_string()))?;
    Ok(Some(value.into_owned()))
}

fn required_attr<T: std::str::FromStr>(
    element: &BytesStart,
    name: &str,
) -> Result<T, OsmSourceError> {
    attr_value(element, name)?
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| {
            OsmSourceError::MalformedXml(format!("element missing or unparsable attribute {name}"))
        })
}

impl OsmSource for XmlSource {
    fn each_node(&mut self, f: &mut dyn FnMut(OsmNode)) -> Result<(), OsmSourceError> {
        let mut reader = Reader::from_file(&self.path)?;
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"node" => {
                    f(OsmNode {
                        id: required_attr(&e, "id")?,
                        latitude: required_attr(&e, "lat")?,
                        longitude: required_attr(&e, "lon")?,
                    });
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(())
    }

    fn each_way(&mut self, f: &mut dyn FnMut(OsmWay)) -> Result<(), OsmSourceError> {
        let mut reader = Reader::from_file(&self.path)?;
        let mut buf = Vec::new();

        // (id, refs, tag pairs) of the way currently being read.
        let mut current: Option<(i64, Vec<i64>, Vec<(String, String)>)> = None;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if e.name().as_ref() == b"way" => {
                    current = Some((required_attr(&e, "id")?, Vec::new(), Vec::new()));
                }
                Event::Empty(e) if e.name().as_ref() == b"way" => {
                    // A childless way carries no node refs; emit as-is and
                    // let the builder drop it.
                    f(OsmWay {
                        id: required_attr(&e, "id")?,
                        node_refs: Vec::new(),
                        tags: WayTags::default(),
                    });
                }
                Event::Empty(e) if e.name().as_ref() == b"nd" => {
                    if let Some((_, refs, _)) = current.as_mut() {
                        refs.push(required_attr(&e, "ref")?);
                    }
                }
                Event::Empty(e) if e.name().as_ref() == b"tag" => {
                    if let Some((_, _, tags)) = current.as_mut() {
                        let key = attr_value(&e, "k")?;
                        let value = attr_value(&e, "v")?;
                        if let (Some(key), Some(value)) = (key, value) {
                            tags.push((key, value));
                        }
                    }
                }
                Event::End(e) if e.name().as_ref() == b"way" => {
                    if let Some((id, node_refs, tags)) = current.take() {
                        f(OsmWay {
                            id,
                            node_refs,
                            tags: WayTags::from_pairs(
                                tags.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                            ),
                        });
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(())
    }
}
