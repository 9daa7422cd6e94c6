// The engine facade: a table handle over one open database file.
//
// A table owns its pager and the root page number (always 0). Opening an
// empty file materializes page 0 as an empty leaf root; closing writes
// every loaded page back and releases the cache. Nothing is persisted
// before a clean close.

use std::path::Path;

use crate::btree;
use crate::error::{DbError, Result};
use crate::node::{self, NodeType};
use crate::pager::Pager;
use crate::row::Row;

pub struct Table {
    pager: Pager,
    root_page_num: u32,
}

impl Table {
    /// Open or create the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Table> {
        let mut pager = Pager::open(path)?;
        let root_page_num = 0;

        if pager.num_pages() == 0 {
            let root = pager.get_page(root_page_num)?;
            node::initialize_leaf_node(root);
            node::set_root(root, true);
        }

        Ok(Table {
            pager,
            root_page_num,
        })
    }

    /// Flush every loaded page and close the file. Consumes the table:
    /// there is no valid handle after close.
    pub fn close(mut self) -> Result<()> {
        self.pager.close()
    }

    /// Insert a row keyed by its id. Fails with `DuplicateKey` if the id is
    /// already present and `TableFull` if the page cap is exhausted; in
    /// both cases the tree is untouched.
    pub fn insert(&mut self, row: &Row) -> Result<()> {
        let key = row.id;
        let cursor = btree::table_find(&mut self.pager, self.root_page_num, key)?;

        {
            let node = self.pager.get_page(cursor.page_num)?;
            let num_cells = node::leaf_num_cells(node);
            if cursor.cell_num < num_cells && node::leaf_key(node, cursor.cell_num as usize) == key
            {
                return Err(DbError::DuplicateKey);
            }
        }

        btree::leaf_node_insert(&mut self.pager, self.root_page_num, &cursor, key, row)
    }

    /// All rows in ascending id order.
    pub fn select(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        let mut cursor = btree::table_start(&mut self.pager, self.root_page_num)?;
        while !cursor.end_of_table {
            let node = self.pager.get_page(cursor.page_num)?;
            rows.push(Row::deserialize(node::leaf_value(
                node,
                cursor.cell_num as usize,
            )));
            btree::cursor_advance(&mut self.pager, &mut cursor)?;
        }
        Ok(rows)
    }

    /// Number of pages the table currently occupies.
    pub fn num_pages(&self) -> u32 {
        self.pager.num_pages()
    }

    /// Render the tree for the `.btree` meta command: node sizes and keys,
    /// children indented under their parent.
    pub fn tree_dump(&mut self) -> Result<String> {
        let mut out = String::new();
        self.dump_node(self.root_page_num, 0, &mut out)?;
        Ok(out)
    }

    fn dump_node(&mut self, page_num: u32, depth: usize, out: &mut String) -> Result<()> {
        let indent = "  ".repeat(depth);
        match node::node_type(self.pager.get_page(page_num)?) {
            NodeType::Leaf => {
                let node = self.pager.get_page(page_num)?;
                let num_cells = node::leaf_num_cells(node);
                out.push_str(&format!("{indent}leaf (size {num_cells})\n"));
                for i in 0..num_cells as usize {
                    let key = node::leaf_key(node, i);
                    out.push_str(&format!("{indent}  - {i}  :  {key}\n"));
                }
            }
            NodeType::Internal => {
                let (num_keys, children, keys) = {
                    let node = self.pager.get_page(page_num)?;
                    let num_keys = node::internal_num_keys(node) as usize;
                    let children: Vec<u32> =
                        (0..=num_keys).map(|i| node::internal_child(node, i)).collect();
                    let keys: Vec<u32> = (0..num_keys).map(|i| node::internal_key(node, i)).collect();
                    (num_keys, children, keys)
                };
                out.push_str(&format!("{indent}internal (size {num_keys})\n"));
                for i in 0..num_keys {
                    self.dump_node(children[i], depth + 1, out)?;
                    out.push_str(&format!("{indent}  key {}\n", keys[i]));
                }
                self.dump_node(children[num_keys], depth + 1, out)?;
            }
        }
        Ok(())
    }
}
