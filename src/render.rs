//! render writes the DOT graphs the `b`/`fl` commands produce: the b-tree
//! structure from `traversal::walk` and the freelist trunk chain from
//! `freelist::walk_trunks`. Grounded on the Python original's `showFreeList`,
//! which builds an equivalent graph with the `graphviz` package's `Digraph`.
//!
//! This tool has no Python-style graphviz binding available, so the DOT
//! source is hand-written with `write!` and handed to a `dot` binary on
//! `$PATH` if one exists; if it doesn't, the `.gv` source file is still
//! written and is usable with any external renderer.

use std::io::Write as _;
use std::process::Command;

use crate::freelist::Trunk;
use crate::traversal::Node;

/// Writes `btree.gv`: one node per page visited by a `traversal::walk`,
/// labeled with its page number and kind; one edge per parent/child link.
pub fn render_btree(root: &Node, path: &str) -> std::io::Result<()> {
    let mut dot = String::new();
    dot.push_str("digraph btree {\n  node [shape=record];\n");
    write_tree_node(&mut dot, root);
    dot.push_str("}\n");
    write_and_try_dot(&dot, path)
}

fn write_tree_node(dot: &mut String, node: &Node) {
    use std::fmt::Write as _;
    match node {
        Node::Leaf { page_number, kind, cell_count } => {
            let _ = writeln!(dot, "  p{} [label=\"{{page {} | {:?} | {} cells}}\"];", page_number, page_number, kind, cell_count);
        }
        Node::Interior { page_number, kind, children } => {
            let _ = writeln!(dot, "  p{} [label=\"{{page {} | {:?}}}\"];", page_number, page_number, kind);
            for child in children {
                let _ = writeln!(dot, "  p{} -> p{};", page_number, child.page_number());
                write_tree_node(dot, child);
            }
        }
        Node::Cycle { page_number } => {
            let _ = writeln!(dot, "  p{} [label=\"cycle back to page {}\" color=red];", page_number, page_number);
        }
        Node::Unreadable { page_number, reason } => {
            let _ = writeln!(dot, "  p{} [label=\"page {} unreadable: {}\" color=red];", page_number, page_number, reason.replace('"', "'"));
        }
    }
}

/// Writes `freelist.gv`: one node per trunk, chained in `next_trunk` order,
/// each labeled with its leaf-page list (or just the count, past 30
/// leaves, matching the Python original's cutoff for keeping the label
/// readable).
pub fn render_freelist(trunks: &[Trunk], path: &str) -> std::io::Result<()> {
    let mut dot = String::new();
    dot.push_str("digraph freelist {\n  node [shape=record];\n");
    for trunk in trunks {
        let label = if trunk.leaf_pages.len() > 30 {
            format!("{} leaves", trunk.leaf_pages.len())
        } else {
            format!("{:?}", trunk.leaf_pages)
        };
        use std::fmt::Write as _;
        let _ = writeln!(dot, "  t{} [label=\"{{trunk {} | {}}}\"];", trunk.page_number, trunk.page_number, label);
        if trunk.next_trunk != 0 {
            let _ = writeln!(dot, "  t{} -> t{};", trunk.page_number, trunk.next_trunk);
        }
    }
    dot.push_str("}\n");
    write_and_try_dot(&dot, path)
}

fn write_and_try_dot(dot: &str, path: &str) -> std::io::Result<()> {
    let mut f = std::fs::File::create(path)?;
    f.write_all(dot.as_bytes())?;
    // Best-effort: render to SVG if `dot` is installed. Silently skip if
    // not; the .gv file is still useful on its own.
    let svg_path = format!("{}.svg", path);
    let _ = Command::new("dot").args(["-Tsvg", path, "-o", &svg_path]).status();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_btree_writes_file() {
        let dir = std::env::temp_dir().join(format!("sqlite-inspect-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("btree.gv");
        let tree = Node::Leaf { page_number: 1, kind: crate::btree::PageType::TableLeaf, cell_count: 3 };
        render_btree(&tree, path.to_str().unwrap()).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("digraph btree"));
        assert!(contents.contains("page 1"));
    }

    #[test]
    fn test_render_freelist_writes_file() {
        let dir = std::env::temp_dir().join(format!("sqlite-inspect-test-fl-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("freelist.gv");
        let trunks = vec![Trunk { page_number: 2, next_trunk: 0, leaf_pages: vec![3, 4] }];
        render_freelist(&trunks, path.to_str().unwrap()).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("trunk 2"));
    }
}
