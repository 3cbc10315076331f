//! repl runs the interactive `cmd:` loop. One function per command, same
//! shape as the Python original's `interactive()`: each command's body is
//! wrapped so a bad page number or a corrupt page reports an error and
//! returns to the prompt rather than ending the session.

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use colored::Colorize;

use crate::btree::cell::{Cell, CellIterator};
use crate::btree::header as bheader;
use crate::freelist;
use crate::master;
use crate::page::{Database, PageKind};
use crate::record::{HeaderIterator, ValueIterator};
use crate::recovery;
use crate::render;
use crate::serial_type;
use crate::traversal;

pub fn run(db: &Database) {
    loop {
        print!("cmd:");
        let _ = io::stdout().flush();
        let mut line = String::new();
        if io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
            break; // EOF, e.g. piped input or a closed terminal.
        }
        let line = line.trim();
        if line.is_empty() {
            println!("'help' for help");
            continue;
        }
        let mut parts = line.split_whitespace();
        let cmd = parts.next().unwrap_or("");
        let arg = parts.next();

        let result = match cmd {
            "h" => cmd_header(db),
            "o" => cmd_overview(db),
            "b" => cmd_btree(db, arg),
            "p" => cmd_analyze_page(db, arg),
            "pr" => cmd_recover(db, arg),
            "pc" => cmd_cells(db, arg),
            "pd" => cmd_hexdump(db, arg),
            "f" => cmd_freelist_trunk(db, arg),
            "fcl" => cmd_freelist_leaf(db, arg),
            "fl" => cmd_freelist_graph(db),
            "help" => {
                print_help();
                Ok(())
            }
            "exit" | "q" => break,
            other => {
                println!("unknown command {:?}; 'help' for help", other);
                Ok(())
            }
        };
        if let Err(e) = result {
            println!("Error with this page");
            println!("{}", e);
        }
    }
}

fn parse_page_arg(arg: Option<&str>) -> Result<usize> {
    let arg = arg.context("this command needs a page number")?;
    Ok(arg.parse::<usize>().context("not a valid page number")?)
}

fn cmd_header(db: &Database) -> Result<()> {
    let h = &db.header;
    println!("Signature: {} (ok: {})", h.signature_string(), h.magic_ok);
    println!("Page size: {}", h.page_size);
    println!("Database size (pages): {}", h.db_size_pages);
    println!("First freelist trunk: {}", h.first_freelist_trunk);
    println!("Freelist page count: {}", h.freelist_page_count);
    println!("Schema cookie: {}", h.schema_cookie);
    println!("Schema format: {}", h.schema_format);
    println!(
        "Payload fractions: max {}, min {}, leaf {}",
        h.max_payload_fraction, h.min_payload_fraction, h.leaf_payload_fraction
    );
    if let Some(m) = &db.length_mismatch {
        println!("{}", m.to_string().yellow());
    }
    for w in &h.warnings {
        println!("{}", w.yellow());
    }
    Ok(())
}

fn cmd_overview(db: &Database) -> Result<()> {
    for pn in 1..=db.page_count() {
        let page = db.page(pn)?;
        let kind = page.kind();
        match kind {
            PageKind::TableLeaf | PageKind::TableInterior | PageKind::IndexLeaf | PageKind::IndexInterior => {
                let header = bheader::parse(&page, page.btree_header_start())?;
                println!(
                    "page {:>6} | offset {:>10} | {:?} | {} cells | first freeblock {}",
                    pn, page.absolute_offset, header.page_type, header.cell_count, header.first_freeblock
                );
            }
            PageKind::CandidateFree => {
                if let Ok(trunk) = freelist::parse_trunk(&page) {
                    println!(
                        "page {:>6} | offset {:>10} | freelist trunk | next {} | {} leaves",
                        pn, page.absolute_offset, trunk.next_trunk, trunk.leaf_pages.len()
                    );
                } else {
                    println!("page {:>6} | offset {:>10} | freelist leaf or unused", pn, page.absolute_offset);
                }
            }
            PageKind::Unknown(b) => {
                println!("page {:>6} | offset {:>10} | unknown kind 0x{:02x}", pn, page.absolute_offset, b);
            }
        }
    }
    Ok(())
}

fn cmd_btree(db: &Database, arg: Option<&str>) -> Result<()> {
    let roots: Vec<(String, usize)> = match arg {
        Some(a) => vec![(format!("page {}", a), a.parse::<usize>().context("not a valid page number")?)],
        None => master::read_schema(db)?
            .into_iter()
            .map(|e| (e.name, e.rootpage as usize))
            .collect(),
    };
    // `b` writes the single requested tree to the fixed `btree.gv` name the
    // external interface promises. When no root is given and the schema
    // lists more than one table, each gets its own `btree-<root>.gv` instead
    // since they can't all share the one name.
    let single = roots.len() == 1;
    for (label, root) in roots {
        let tree = traversal::walk(db, root);
        println!("{}: {}", label, describe_tree(&tree));
        let path = if single { "btree.gv".to_string() } else { format!("btree-{}.gv", root) };
        render::render_btree(&tree, &path)?;
        println!("wrote {}", path);
    }
    Ok(())
}

fn describe_tree(node: &traversal::Node) -> String {
    match node {
        traversal::Node::Leaf { page_number, kind, cell_count } => {
            format!("leaf(page={}, kind={:?}, cells={})", page_number, kind, cell_count)
        }
        traversal::Node::Interior { page_number, kind, children } => {
            let child_descriptions: Vec<String> = children.iter().map(describe_tree).collect();
            format!("interior(page={}, kind={:?}, children=[{}])", page_number, kind, child_descriptions.join(", "))
        }
        traversal::Node::Cycle { page_number } => format!("cycle(page={})", page_number),
        traversal::Node::Unreadable { page_number, reason } => format!("unreadable(page={}, {})", page_number, reason),
    }
}

fn cmd_analyze_page(db: &Database, arg: Option<&str>) -> Result<()> {
    let pn = parse_page_arg(arg)?;
    let page = db.page(pn)?;
    let kind = page.kind();
    if !kind.is_btree() {
        bail!("page {} is kind {:?}, not a b-tree page", pn, kind);
    }
    let header = bheader::parse(&page, page.btree_header_start())?;
    println!("Page {}: {:?}", pn, header.page_type);
    println!("Cell count: {}", header.cell_count);
    println!("Cell content start: {}", header.cell_content_start);
    println!("First freeblock: {}", header.first_freeblock);
    println!("Fragmented free bytes: {}", header.fragmented_free_bytes);
    if let Some(r) = header.rightmost_pointer {
        println!("Rightmost pointer: {}", r);
    }
    let report = header.check(&page);
    if !report.cell_content_start_in_range {
        println!("{}", "cell content start is outside [headerSize + 2*cellCount, pageSize)".red());
    }
    for i in &report.pointer_violations {
        println!("{}", format!("cell {}: pointer is outside [{}, {})", i, header.cell_content_start, page.bytes.len()).red());
    }
    for (a, b) in &report.overlaps {
        println!("{}", format!("cells {} and {} overlap", a, b).red());
    }
    if !report.accounting_closes {
        println!(
            "{}",
            format!(
                "page accounting does not close: {} bytes accounted for, {} expected",
                report.accounted_bytes, report.expected_bytes
            )
            .yellow()
        );
    }
    if report.is_clean() {
        println!("Page accounting checks out.");
    }
    Ok(())
}

fn cmd_recover(db: &Database, arg: Option<&str>) -> Result<()> {
    let pn = parse_page_arg(arg)?;
    let page = db.page(pn)?;
    let header = bheader::parse(&page, page.btree_header_start())?;
    let report = recovery::recover(&page, &header);
    if report.freeblocks.is_empty() {
        println!("No free blocks to retrieve.");
    }
    for fb in &report.freeblocks {
        println!(
            "Free block: offset {:06x}, size {}, data {}",
            fb.offset,
            fb.size,
            fb.bytes.iter().map(|b| format!("{:02x}", b)).collect::<String>()
        );
    }
    if report.corrupt_chain {
        println!("{}", "freeblock chain is corrupt past this point".red());
    }
    if let Some(gap) = &report.unallocated_gap {
        println!(
            "{}",
            format!(
                "unallocated gap between the cell-pointer array and cell content is non-zero ({} bytes), possible recently-deleted data",
                gap.len()
            )
            .yellow()
        );
    }
    Ok(())
}

fn cmd_cells(db: &Database, arg: Option<&str>) -> Result<()> {
    let pn = parse_page_arg(arg)?;
    let page = db.page(pn)?;
    let header = bheader::parse(&page, page.btree_header_start())?;
    for (i, cell) in CellIterator::new(&page, &header)?.enumerate() {
        let cell = cell?;
        match cell {
            Cell::TableLeaf { rowid, declared_payload_len, payload, truncated } => {
                println!("cell {}: table leaf, rowid {}, declared payload {} bytes{}", i, rowid, declared_payload_len, if truncated { " (truncated)" } else { "" });
                print_record(payload);
            }
            Cell::TableInterior { left_child, rowid } => {
                println!("cell {}: table interior, left child {}, rowid {}", i, left_child, rowid);
            }
            Cell::IndexLeaf { declared_payload_len, payload, truncated } => {
                println!("cell {}: index leaf, declared payload {} bytes{}", i, declared_payload_len, if truncated { " (truncated)" } else { "" });
                print_record(payload);
            }
            Cell::IndexInterior { left_child, declared_payload_len, payload, truncated } => {
                println!("cell {}: index interior, left child {}, declared payload {} bytes{}", i, left_child, declared_payload_len, if truncated { " (truncated)" } else { "" });
                print_record(payload);
            }
        }
    }
    Ok(())
}

fn print_record(payload: &[u8]) {
    let serial_types: Vec<i64> = HeaderIterator::new(payload).collect();
    println!("  header: {:?}", serial_types);
    let values = ValueIterator::new(payload);
    for (serial_type, bytes) in values {
        let type_name = serial_type::typecode_to_string(serial_type);
        match serial_type::to_value(serial_type, bytes) {
            Ok(v) => println!("  [{}] {} = {}", type_name, serial_type, format_value(&v)),
            Err(e) => println!("  {}", format!("[{}] {} = <error: {}>", type_name, serial_type, e).yellow()),
        }
    }
}

fn format_value(v: &serial_type::Value) -> String {
    match v {
        serial_type::Value::Null => "NULL".to_string(),
        serial_type::Value::Int(i) => i.to_string(),
        serial_type::Value::Real(f) => f.to_string(),
        serial_type::Value::Text(s) => {
            if s.len() > 100 {
                format!("{:?}...", &s[..100])
            } else {
                format!("{:?}", s)
            }
        }
        serial_type::Value::Blob(b) => {
            if b.len() <= 32 {
                format!("x'{}'", hex::encode(b))
            } else {
                format!("x'{}...' ({} bytes)", hex::encode(&b[..32]), b.len())
            }
        }
    }
}

fn cmd_hexdump(db: &Database, arg: Option<&str>) -> Result<()> {
    let pn = parse_page_arg(arg)?;
    let page = db.page(pn)?;
    let kind = page.kind();
    let header = if kind.is_btree() {
        Some(bheader::parse(&page, page.btree_header_start())?)
    } else {
        None
    };
    print!("{}", crate::hexdump::dump(&page, header.as_ref()));
    Ok(())
}

fn cmd_freelist_trunk(db: &Database, arg: Option<&str>) -> Result<()> {
    let pn = parse_page_arg(arg)?;
    let page = db.page(pn)?;
    let trunk = freelist::parse_trunk(&page)?;
    println!("Trunk page {}: next trunk {}, leaves {:?}", trunk.page_number, trunk.next_trunk, trunk.leaf_pages);
    Ok(())
}

fn cmd_freelist_leaf(db: &Database, arg: Option<&str>) -> Result<()> {
    let pn = parse_page_arg(arg)?;
    let page = db.page(pn)?;
    match freelist::check_leaf(&page) {
        freelist::LeafCheck::Clean => println!("page {} is a clean (all-zero) freelist leaf", pn),
        freelist::LeafCheck::Dirty(_) => {
            println!("page {} is a dirty freelist leaf; hex dump follows", pn);
            print!("{}", crate::hexdump::dump(&page, None));
        }
    }
    Ok(())
}

fn cmd_freelist_graph(db: &Database) -> Result<()> {
    let trunks: Vec<_> = freelist::walk_trunks(db, db.header.first_freelist_trunk)
        .into_iter()
        .filter_map(|r| r.ok())
        .collect();
    render::render_freelist(&trunks, "freelist.gv")?;
    println!("wrote freelist.gv");
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("h\t\tShow header info");
    println!("o\t\tShow overview of all pages");
    println!("b [n]\t\trender B-tree rooted at page n (default: every master-table entry)");
    println!("p n\t\tanalyze page n (as a normal b-tree page)");
    println!("pr n\t\tsearch for removed data on page n");
    println!("pc n\t\tprint cell data on page n");
    println!("pd n\t\tprint hex dump of page n");
    println!("f n\t\tanalyze page n (as a freelist trunk page)");
    println!("fcl n\t\tcheck if freelist leaf page n is empty");
    println!("fl\t\tshow freelist graph");
    println!("exit|q\t\texit");
}
