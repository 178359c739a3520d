//! SVT text format: line-oriented ASCII dumps for visualization, plus a
//! loader used by the round-trip tests.
//!
//! ```text
//! --------
//! Name: <free text>
//! Point color: r g b        (optional)
//! Edge color: r g b         (optional)
//! Points:
//! <x> <y> [z]               one per vertex
//! Edges:
//! <i> <j>                   indices into the point block above
//! Faces:                    (optional)
//! <i> <j> <k>
//! --------
//! ```
//!
//! [`dump_net`] writes the whole graph as one section and is the inverse
//! of [`load`] up to vertex ordering; [`dump_classes`] writes one
//! colored section per vertex class with intra-class edges only, which
//! is the traditional visualization layout.

use crate::error::{EngineError, ErrorCode};
use crate::graph::{Graph, VertexClass};
use crate::point::Point;
use std::collections::HashMap;
use std::io::{self, Write};

const FENCE: &str = "--------";

fn write_coords<W: Write>(out: &mut W, coords: &[f64]) -> io::Result<()> {
    let mut first = true;
    for c in coords {
        if !first {
            write!(out, " ")?;
        }
        write!(out, "{}", c)?;
        first = false;
    }
    writeln!(out)
}

/// Dumps the whole net as a single section. Only 2-D and 3-D graphs are
/// dumped; other dimensions write nothing.
pub fn dump_net<W: Write>(graph: &Graph, out: &mut W, name: Option<&str>) -> io::Result<()> {
    let dim = match graph.iter_vertices().next() {
        Some((_, v)) => v.w.dim(),
        None => return Ok(()),
    };
    if dim != 2 && dim != 3 {
        return Ok(());
    }

    writeln!(out, "{}", FENCE)?;
    if let Some(name) = name {
        writeln!(out, "Name: {}", name)?;
    }
    writeln!(out, "Points:")?;
    let mut ids = HashMap::new();
    for (i, (id, v)) in graph.iter_vertices().enumerate() {
        ids.insert(id, i);
        write_coords(out, v.w.coords())?;
    }
    writeln!(out, "Edges:")?;
    for (_, e) in graph.iter_edges() {
        writeln!(out, "{} {}", ids[&e.ends[0]], ids[&e.ends[1]])?;
    }
    if graph.face_count() > 0 {
        writeln!(out, "Faces:")?;
        for (_, f) in graph.iter_faces() {
            writeln!(
                out,
                "{} {} {}",
                ids[&f.corners[0]], ids[&f.corners[1]], ids[&f.corners[2]]
            )?;
        }
    }
    writeln!(out, "{}", FENCE)
}

/// Dumps one colored section per class (NONE grey, FREE blue, OBST red)
/// with the edges internal to each class.
pub fn dump_classes<W: Write>(graph: &Graph, out: &mut W, name: Option<&str>) -> io::Result<()> {
    let sections = [
        (VertexClass::None, "none", "0.7 0.7 0.7"),
        (VertexClass::Free, "free", "0 0 0.8"),
        (VertexClass::Obst, "obst", "0.8 0 0"),
    ];
    for (class, label, color) in sections {
        let mut ids = HashMap::new();
        for (id, v) in graph.iter_vertices() {
            if v.class == class {
                let next = ids.len();
                ids.insert(id, next);
            }
        }
        if ids.is_empty() {
            continue;
        }
        writeln!(out, "{}", FENCE)?;
        match name {
            Some(name) => writeln!(out, "Name: {} ({})", name, label)?,
            None => writeln!(out, "Name: ({})", label)?,
        }
        writeln!(out, "Point color: {}", color)?;
        writeln!(out, "Edge color: {}", color)?;
        writeln!(out, "Points:")?;
        for (id, v) in graph.iter_vertices() {
            if ids.contains_key(&id) {
                write_coords(out, v.w.coords())?;
            }
        }
        writeln!(out, "Edges:")?;
        for (_, e) in graph.iter_edges() {
            if let (Some(i), Some(j)) = (ids.get(&e.ends[0]), ids.get(&e.ends[1])) {
                writeln!(out, "{} {}", i, j)?;
            }
        }
        writeln!(out, "{}", FENCE)?;
    }
    Ok(())
}

// ── Loader ───────────────────────────────────────────────────────────

/// One parsed SVT section.
#[derive(Debug, Clone, Default)]
pub struct SvtSection {
    pub name: Option<String>,
    pub point_color: Option<[f64; 3]>,
    pub edge_color: Option<[f64; 3]>,
    pub points: Vec<Vec<f64>>,
    pub edges: Vec<(usize, usize)>,
    pub faces: Vec<(usize, usize, usize)>,
}

impl SvtSection {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.points.is_empty() && self.edges.is_empty()
    }

    /// Rebuilds a graph from the section's points and edges.
    pub fn to_graph(&self) -> Result<Graph, EngineError> {
        let mut graph = Graph::new();
        let ids: Vec<_> =
            self.points.iter().map(|p| graph.add_vertex(Point::new(p.clone()))).collect();
        for &(i, j) in &self.edges {
            graph.add_edge(ids[i], ids[j]);
        }
        for &(i, j, k) in &self.faces {
            graph.add_face([ids[i], ids[j], ids[k]]);
        }
        Ok(graph)
    }
}

/// A parsed SVT document.
#[derive(Debug, Clone, Default)]
pub struct SvtScene {
    pub sections: Vec<SvtSection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Preamble,
    Points,
    Edges,
    Faces,
}

fn parse_color(rest: &str, lineno: usize) -> Result<[f64; 3], EngineError> {
    let parts: Result<Vec<f64>, _> = rest.split_whitespace().map(str::parse).collect();
    let parts = parts.map_err(|_| bad(lineno, "malformed color"))?;
    if parts.len() != 3 {
        return Err(bad(lineno, "expected three color components"));
    }
    Ok([parts[0], parts[1], parts[2]])
}

fn bad(lineno: usize, msg: &str) -> EngineError {
    EngineError::new(ErrorCode::InvalidSvt, format!("line {}: {}", lineno, msg))
}

/// Parses an SVT document. Tolerates consecutive fences and unknown
/// decoration lines (`Point size:` and friends are ignored).
pub fn load(input: &str) -> Result<SvtScene, EngineError> {
    let mut scene = SvtScene::default();
    let mut section = SvtSection::default();
    let mut block = Block::Preamble;

    fn close(section: &mut SvtSection, scene: &mut SvtScene) {
        if section.is_empty() {
            *section = SvtSection::default();
        } else {
            scene.sections.push(std::mem::take(section));
        }
    }

    for (idx, raw) in input.lines().enumerate() {
        let lineno = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.chars().all(|c| c == '-') && line.len() >= 3 {
            close(&mut section, &mut scene);
            block = Block::Preamble;
            continue;
        }
        if let Some(rest) = line.strip_prefix("Name:") {
            section.name = Some(rest.trim().to_string());
            block = Block::Preamble;
        } else if let Some(rest) = line.strip_prefix("Point color:") {
            section.point_color = Some(parse_color(rest, lineno)?);
        } else if let Some(rest) = line.strip_prefix("Edge color:") {
            section.edge_color = Some(parse_color(rest, lineno)?);
        } else if line == "Points:" {
            block = Block::Points;
        } else if line == "Edges:" {
            block = Block::Edges;
        } else if line == "Faces:" {
            block = Block::Faces;
        } else if line.contains(':') {
            // Unknown decoration (point sizes, edge widths); skip.
        } else {
            match block {
                Block::Preamble => return Err(bad(lineno, "data before a block header")),
                Block::Points => {
                    let coords: Result<Vec<f64>, _> =
                        line.split_whitespace().map(str::parse).collect();
                    let coords =
                        coords.map_err(|_| bad(lineno, "malformed point coordinates"))?;
                    if coords.len() != 2 && coords.len() != 3 {
                        return Err(bad(lineno, "points must have 2 or 3 coordinates"));
                    }
                    section.points.push(coords);
                }
                Block::Edges => {
                    let idxs: Result<Vec<usize>, _> =
                        line.split_whitespace().map(str::parse).collect();
                    let idxs = idxs.map_err(|_| bad(lineno, "malformed edge indices"))?;
                    if idxs.len() != 2 {
                        return Err(bad(lineno, "edges must have 2 indices"));
                    }
                    if idxs.iter().any(|&i| i >= section.points.len()) {
                        return Err(bad(lineno, "edge index out of range"));
                    }
                    section.edges.push((idxs[0], idxs[1]));
                }
                Block::Faces => {
                    let idxs: Result<Vec<usize>, _> =
                        line.split_whitespace().map(str::parse).collect();
                    let idxs = idxs.map_err(|_| bad(lineno, "malformed face indices"))?;
                    if idxs.len() != 3 {
                        return Err(bad(lineno, "faces must have 3 indices"));
                    }
                    if idxs.iter().any(|&i| i >= section.points.len()) {
                        return Err(bad(lineno, "face index out of range"));
                    }
                    section.faces.push((idxs[0], idxs[1], idxs[2]));
                }
            }
        }
    }
    close(&mut section, &mut scene);
    Ok(scene)
}
