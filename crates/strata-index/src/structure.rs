//! Graphviz rendering of a trie, for debugging layouts.

use strata_store::StoreReader;

use crate::error::IndexResult;
use crate::hash::HASH_INDEX_BITS;
use crate::pointer::{IndexPointer, NodeView};

/// Render the trie below `root` in DOT.
///
/// Stored nodes are named by address, so shared subtrees of two renderings
/// line up. Heap nodes are drawn dashed.
pub fn to_dot<R: StoreReader + ?Sized>(db: &R, root: &IndexPointer) -> IndexResult<String> {
    let mut dot = Dot {
        out: String::from("digraph index {\n    node [shape=record];\n"),
        heap_nodes: 0,
    };
    dot.visit(db, root, 0)?;
    dot.out.push_str("}\n");
    Ok(dot.out)
}

struct Dot {
    out: String,
    heap_nodes: usize,
}

impl Dot {
    fn line(&mut self, text: String) {
        self.out.push_str("    ");
        self.out.push_str(&text);
        self.out.push('\n');
    }

    fn visit<R: StoreReader + ?Sized>(
        &mut self,
        db: &R,
        ptr: &IndexPointer,
        shifts: u32,
    ) -> IndexResult<Option<String>> {
        let name = match ptr.resolve(db, shifts)? {
            NodeView::Empty => return Ok(None),
            NodeView::Leaf(addr) => {
                let name = format!("leaf_{:x}", addr.absolute());
                self.line(format!("{name} [shape=ellipse label=\"{addr}\"];"));
                name
            }
            NodeView::Internal(node, addr) => {
                let name = self.node_name(addr);
                let style = if addr.is_none() { " style=dashed" } else { "" };
                let at = addr.map(|a| a.to_string()).unwrap_or_else(|| "heap".into());
                self.line(format!(
                    "{name} [label=\"internal|{at}|bitmap {:#018x}\"{style}];",
                    node.bitmap()
                ));
                let chunks = (0..64).filter(|bit| node.bitmap() & (1u64 << bit) != 0);
                for (chunk, child) in chunks.zip(node.children()) {
                    if let Some(child_name) = self.visit(db, child, shifts + HASH_INDEX_BITS)? {
                        self.line(format!("{name} -> {child_name} [label=\"{chunk}\"];"));
                    }
                }
                name
            }
            NodeView::Linear(node, addr) => {
                let name = self.node_name(addr);
                let style = if addr.is_none() { " style=dashed" } else { "" };
                let at = addr.map(|a| a.to_string()).unwrap_or_else(|| "heap".into());
                self.line(format!(
                    "{name} [label=\"linear|{at}|{} leaves\"{style}];",
                    node.len()
                ));
                for leaf in node.leaves() {
                    let leaf_name = format!("leaf_{:x}", leaf.absolute());
                    self.line(format!("{leaf_name} [shape=ellipse label=\"{leaf}\"];"));
                    self.line(format!("{name} -> {leaf_name};"));
                }
                name
            }
        };
        Ok(Some(name))
    }

    fn node_name(&mut self, addr: Option<strata_types::Address>) -> String {
        match addr {
            Some(addr) => format!("node_{:x}", addr.absolute()),
            None => {
                self.heap_nodes += 1;
                format!("heap_{}", self.heap_nodes)
            }
        }
    }
}
