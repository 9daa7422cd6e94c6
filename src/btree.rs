// B+-tree operations: ordered lookup, ordered insert, leaf splits, and the
// cursor used for full-table scans.
//
// Keys are unique u32 row ids. Only leaves hold values; internal nodes hold
// separator keys, where the key at position i is the maximum key in the
// subtree of child i. Page 0 is always the root: the first leaf split
// rewrites it in place as an internal node over two fresh leaves, so the
// root never moves.

use crate::error::{DbError, Result};
use crate::node::{
    self, NodeType, INTERNAL_NODE_MAX_KEYS, LEAF_NODE_LEFT_SPLIT_COUNT, LEAF_NODE_MAX_CELLS,
    LEAF_NODE_RIGHT_SPLIT_COUNT,
};
use crate::pager::{PageBuf, Pager, TABLE_MAX_PAGES};
use crate::row::Row;

/// A position in the tree's ordered sequence of leaf cells.
pub struct Cursor {
    pub page_num: u32,
    pub cell_num: u32,
    pub end_of_table: bool,
}

/// Position a cursor at the first cell of the leftmost leaf.
pub fn table_start(pager: &mut Pager, root_page_num: u32) -> Result<Cursor> {
    // Key 0 sorts at or before every stored key, so finding it lands on
    // cell 0 of the leftmost leaf regardless of tree depth.
    let mut cursor = table_find(pager, root_page_num, 0)?;
    let node = pager.get_page(cursor.page_num)?;
    cursor.end_of_table = node::leaf_num_cells(node) == 0;
    Ok(cursor)
}

/// Find `key`, or the position where it would be inserted.
pub fn table_find(pager: &mut Pager, root_page_num: u32, key: u32) -> Result<Cursor> {
    match node::node_type(pager.get_page(root_page_num)?) {
        NodeType::Leaf => leaf_node_find(pager, root_page_num, key),
        NodeType::Internal => internal_node_find(pager, root_page_num, key),
    }
}

fn internal_node_find(pager: &mut Pager, page_num: u32, key: u32) -> Result<Cursor> {
    let child_page_num = {
        let node = pager.get_page(page_num)?;
        node::internal_child(node, internal_find_child(node, key))
    };
    match node::node_type(pager.get_page(child_page_num)?) {
        NodeType::Leaf => leaf_node_find(pager, child_page_num, key),
        NodeType::Internal => internal_node_find(pager, child_page_num, key),
    }
}

/// Index of the child whose subtree could contain `key`: the smallest i
/// with key(i) >= key, or the right child when every separator is smaller.
fn internal_find_child(node: &[u8], key: u32) -> usize {
    let num_keys = node::internal_num_keys(node) as usize;

    let mut min_index = 0;
    let mut max_index = num_keys;
    while min_index != max_index {
        let index = (min_index + max_index) / 2;
        if node::internal_key(node, index) >= key {
            max_index = index;
        } else {
            min_index = index + 1;
        }
    }
    min_index
}

fn leaf_node_find(pager: &mut Pager, page_num: u32, key: u32) -> Result<Cursor> {
    let node = pager.get_page(page_num)?;
    let num_cells = node::leaf_num_cells(node);

    // Binary search over [min_index, one_past_max_index).
    let mut min_index = 0u32;
    let mut one_past_max_index = num_cells;
    while one_past_max_index != min_index {
        let index = (min_index + one_past_max_index) / 2;
        let key_at_index = node::leaf_key(node, index as usize);
        if key == key_at_index {
            return Ok(Cursor {
                page_num,
                cell_num: index,
                end_of_table: false,
            });
        }
        if key < key_at_index {
            one_past_max_index = index;
        } else {
            min_index = index + 1;
        }
    }

    Ok(Cursor {
        page_num,
        cell_num: min_index,
        end_of_table: false,
    })
}

/// Advance to the next cell, crossing into the next leaf when the current
/// one is exhausted.
pub fn cursor_advance(pager: &mut Pager, cursor: &mut Cursor) -> Result<()> {
    cursor.cell_num += 1;
    let num_cells = node::leaf_num_cells(pager.get_page(cursor.page_num)?);
    if cursor.cell_num < num_cells {
        return Ok(());
    }
    match next_leaf(pager, cursor.page_num)? {
        Some(page_num) => {
            cursor.page_num = page_num;
            cursor.cell_num = 0;
        }
        None => cursor.end_of_table = true,
    }
    Ok(())
}

/// The leaf after `page_num` in key order, if any. Leaves carry no sibling
/// links, so this climbs parent pointers until an ancestor has a child to
/// the right, then descends that child's leftmost spine.
fn next_leaf(pager: &mut Pager, page_num: u32) -> Result<Option<u32>> {
    let mut current = page_num;
    loop {
        let (current_is_root, parent_page_num) = {
            let node = pager.get_page(current)?;
            (node::is_root(node), node::parent(node))
        };
        if current_is_root {
            return Ok(None);
        }

        let (child_index, num_keys) = {
            let parent = pager.get_page(parent_page_num)?;
            (
                internal_child_index(parent, current)?,
                node::internal_num_keys(parent) as usize,
            )
        };

        if child_index < num_keys {
            let mut next = {
                let parent = pager.get_page(parent_page_num)?;
                node::internal_child(parent, child_index + 1)
            };
            loop {
                let node = pager.get_page(next)?;
                match node::node_type(node) {
                    NodeType::Leaf => return Ok(Some(next)),
                    NodeType::Internal => next = node::internal_child(node, 0),
                }
            }
        }

        current = parent_page_num;
    }
}

fn internal_child_index(node: &[u8], child_page_num: u32) -> Result<usize> {
    let num_keys = node::internal_num_keys(node) as usize;
    for i in 0..=num_keys {
        if node::internal_child(node, i) == child_page_num {
            return Ok(i);
        }
    }
    Err(DbError::Corrupt(format!(
        "page {child_page_num} is not a child of its parent"
    )))
}

/// Insert a cell at the cursor position, splitting the leaf when full.
pub fn leaf_node_insert(
    pager: &mut Pager,
    root_page_num: u32,
    cursor: &Cursor,
    key: u32,
    row: &Row,
) -> Result<()> {
    let num_cells = node::leaf_num_cells(pager.get_page(cursor.page_num)?) as usize;
    if num_cells >= LEAF_NODE_MAX_CELLS {
        return leaf_node_split_and_insert(pager, root_page_num, cursor, key, row);
    }

    let node = pager.get_page(cursor.page_num)?;
    let cell_num = cursor.cell_num as usize;
    // Shift cells at and after the insertion point one slot right.
    for i in (cell_num..num_cells).rev() {
        node::copy_leaf_cell(node, i, i + 1);
    }
    node::set_leaf_num_cells(node, num_cells as u32 + 1);
    node::set_leaf_key(node, cell_num, key);
    row.serialize(node::leaf_value_mut(node, cell_num));
    Ok(())
}

/// Split a full leaf and insert the incoming cell.
///
/// The max_cells + 1 conceptual cells (the existing ones with the incoming
/// cell at the cursor position) are redistributed: the lower half stays in
/// the old leaf, the upper half moves to a freshly allocated one. The
/// parent then gains an entry for the new leaf, or a new root is built when
/// the old leaf was the root.
fn leaf_node_split_and_insert(
    pager: &mut Pager,
    root_page_num: u32,
    cursor: &Cursor,
    key: u32,
    row: &Row,
) -> Result<()> {
    let (old_was_root, old_parent, old_cells) = {
        let node = pager.get_page(cursor.page_num)?;
        let mut cells = Vec::with_capacity(LEAF_NODE_MAX_CELLS);
        for i in 0..LEAF_NODE_MAX_CELLS {
            cells.push(node::leaf_cell(node, i).to_vec());
        }
        (node::is_root(node), node::parent(node), cells)
    };

    // Splitting the root needs a second fresh page for the left child.
    // Surface page exhaustion before any page is modified.
    let pages_needed: u32 = if old_was_root { 2 } else { 1 };
    if pager.unused_page_num() + pages_needed > TABLE_MAX_PAGES as u32 {
        return Err(DbError::TableFull);
    }

    let new_page_num = pager.unused_page_num();
    {
        let new_node = pager.get_page(new_page_num)?;
        node::initialize_leaf_node(new_node);
        node::set_parent(new_node, old_parent);
    }

    let cell_num = cursor.cell_num as usize;
    for i in 0..=LEAF_NODE_MAX_CELLS {
        let (dest_page_num, index_within_node) = if i >= LEAF_NODE_LEFT_SPLIT_COUNT {
            (new_page_num, i - LEAF_NODE_LEFT_SPLIT_COUNT)
        } else {
            (cursor.page_num, i)
        };
        let dest_node = pager.get_page(dest_page_num)?;
        if i == cell_num {
            node::set_leaf_key(dest_node, index_within_node, key);
            row.serialize(node::leaf_value_mut(dest_node, index_within_node));
        } else if i > cell_num {
            node::leaf_cell_mut(dest_node, index_within_node).copy_from_slice(&old_cells[i - 1]);
        } else {
            node::leaf_cell_mut(dest_node, index_within_node).copy_from_slice(&old_cells[i]);
        }
    }

    node::set_leaf_num_cells(
        pager.get_page(cursor.page_num)?,
        LEAF_NODE_LEFT_SPLIT_COUNT as u32,
    );
    node::set_leaf_num_cells(
        pager.get_page(new_page_num)?,
        LEAF_NODE_RIGHT_SPLIT_COUNT as u32,
    );

    if old_was_root {
        create_new_root(pager, root_page_num, new_page_num)
    } else {
        internal_node_register_split(pager, old_parent, cursor.page_num, new_page_num)
    }
}

/// Rebuild page `root_page_num` as an internal root over two children.
///
/// The old root's bytes (holding the post-split left half) move to a fresh
/// page, which becomes the left child; the right child is passed in.
fn create_new_root(pager: &mut Pager, root_page_num: u32, right_child_page_num: u32) -> Result<()> {
    let left_child_page_num = pager.unused_page_num();
    let root_copy: PageBuf = *pager.get_page(root_page_num)?;

    let left_child_max_key = {
        let left_child = pager.get_page(left_child_page_num)?;
        left_child.copy_from_slice(&root_copy);
        node::set_root(left_child, false);
        node::set_parent(left_child, root_page_num);
        node::node_max_key(left_child)
    };

    {
        let right_child = pager.get_page(right_child_page_num)?;
        node::set_parent(right_child, root_page_num);
    }

    let root = pager.get_page(root_page_num)?;
    node::initialize_internal_node(root);
    node::set_root(root, true);
    node::set_internal_num_keys(root, 1);
    node::set_internal_child(root, 0, left_child_page_num);
    node::set_internal_key(root, 0, left_child_max_key);
    node::set_internal_right_child(root, right_child_page_num);
    Ok(())
}

/// After a non-root leaf split, record the new leaf in the parent: the old
/// child's separator shrinks to its new max key and the new child slots in
/// directly to its right.
fn internal_node_register_split(
    pager: &mut Pager,
    parent_page_num: u32,
    old_child_page_num: u32,
    new_child_page_num: u32,
) -> Result<()> {
    let old_child_max = node::node_max_key(pager.get_page(old_child_page_num)?);
    let new_child_max = node::node_max_key(pager.get_page(new_child_page_num)?);

    let parent = pager.get_page(parent_page_num)?;
    let num_keys = node::internal_num_keys(parent) as usize;
    if num_keys >= INTERNAL_NODE_MAX_KEYS {
        // Would need an internal-node split, which this tree does not do.
        return Err(DbError::Internal(
            "internal node is full; splitting internal nodes is not supported".into(),
        ));
    }

    let child_index = internal_child_index(parent, old_child_page_num)?;
    node::set_internal_num_keys(parent, num_keys as u32 + 1);

    if child_index == num_keys {
        // The old child was the rightmost: it moves into the cell array and
        // the new child takes over the right-child slot.
        node::set_internal_child(parent, num_keys, old_child_page_num);
        node::set_internal_key(parent, num_keys, old_child_max);
        node::set_internal_right_child(parent, new_child_page_num);
    } else {
        for i in (child_index + 1..num_keys).rev() {
            node::copy_internal_cell(parent, i, i + 1);
        }
        node::set_internal_key(parent, child_index, old_child_max);
        node::set_internal_child(parent, child_index + 1, new_child_page_num);
        node::set_internal_key(parent, child_index + 1, new_child_max);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pager() -> (tempfile::TempDir, Pager) {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(dir.path().join("test.db")).unwrap();
        let root = pager.get_page(0).unwrap();
        node::initialize_leaf_node(root);
        node::set_root(root, true);
        (dir, pager)
    }

    fn row(id: u32) -> Row {
        Row {
            id,
            username: format!("user{id}"),
            email: format!("user{id}@example.com"),
        }
    }

    fn insert(pager: &mut Pager, id: u32) {
        let cursor = table_find(pager, 0, id).unwrap();
        leaf_node_insert(pager, 0, &cursor, id, &row(id)).unwrap();
    }

    fn scan_keys(pager: &mut Pager) -> Vec<u32> {
        let mut keys = Vec::new();
        let mut cursor = table_start(pager, 0).unwrap();
        while !cursor.end_of_table {
            let node = pager.get_page(cursor.page_num).unwrap();
            keys.push(node::leaf_key(node, cursor.cell_num as usize));
            cursor_advance(pager, &mut cursor).unwrap();
        }
        keys
    }

    #[test]
    fn test_find_in_empty_root() {
        let (_dir, mut pager) = test_pager();
        let cursor = table_find(&mut pager, 0, 5).unwrap();
        assert_eq!(cursor.page_num, 0);
        assert_eq!(cursor.cell_num, 0);
    }

    #[test]
    fn test_find_returns_insertion_point() {
        let (_dir, mut pager) = test_pager();
        for id in [10, 20, 30] {
            insert(&mut pager, id);
        }
        assert_eq!(table_find(&mut pager, 0, 5).unwrap().cell_num, 0);
        assert_eq!(table_find(&mut pager, 0, 15).unwrap().cell_num, 1);
        assert_eq!(table_find(&mut pager, 0, 20).unwrap().cell_num, 1);
        assert_eq!(table_find(&mut pager, 0, 99).unwrap().cell_num, 3);
    }

    #[test]
    fn test_inserts_stay_sorted_within_leaf() {
        let (_dir, mut pager) = test_pager();
        for id in [5, 1, 9, 3, 7] {
            insert(&mut pager, id);
        }
        assert_eq!(scan_keys(&mut pager), vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_root_split_shape() {
        let (_dir, mut pager) = test_pager();
        for id in 1..=(LEAF_NODE_MAX_CELLS as u32 + 1) {
            insert(&mut pager, id);
        }

        let (left_page, right_page, separator) = {
            let root = pager.get_page(0).unwrap();
            assert_eq!(node::node_type(root), NodeType::Internal);
            assert!(node::is_root(root));
            assert_eq!(node::internal_num_keys(root), 1);
            (
                node::internal_child(root, 0),
                node::internal_right_child(root),
                node::internal_key(root, 0),
            )
        };

        let left_max = {
            let left = pager.get_page(left_page).unwrap();
            assert_eq!(node::node_type(left), NodeType::Leaf);
            assert!(!node::is_root(left));
            assert_eq!(node::parent(left), 0);
            assert_eq!(
                node::leaf_num_cells(left),
                LEAF_NODE_LEFT_SPLIT_COUNT as u32
            );
            node::node_max_key(left)
        };
        assert_eq!(separator, left_max);

        let right = pager.get_page(right_page).unwrap();
        assert_eq!(node::parent(right), 0);
        assert_eq!(
            node::leaf_num_cells(right),
            LEAF_NODE_RIGHT_SPLIT_COUNT as u32
        );
    }

    #[test]
    fn test_scan_crosses_leaves_after_split() {
        let (_dir, mut pager) = test_pager();
        for id in 1..=14 {
            insert(&mut pager, id);
        }
        assert_eq!(scan_keys(&mut pager), (1..=14).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_with_insert_landing_in_left_half() {
        let (_dir, mut pager) = test_pager();
        // Fill the leaf leaving a gap at the low end, then insert into it.
        for id in 2..=14 {
            insert(&mut pager, id);
        }
        insert(&mut pager, 1);
        assert_eq!(scan_keys(&mut pager), (1..=14).collect::<Vec<_>>());
    }

    #[test]
    fn test_descending_inserts_across_splits() {
        let (_dir, mut pager) = test_pager();
        for id in (1..=40).rev() {
            insert(&mut pager, id);
        }
        assert_eq!(scan_keys(&mut pager), (1..=40).collect::<Vec<_>>());
    }

    #[test]
    fn test_find_descends_internal_root() {
        let (_dir, mut pager) = test_pager();
        for id in 1..=14 {
            insert(&mut pager, id);
        }
        for id in 1..=14u32 {
            let cursor = table_find(&mut pager, 0, id).unwrap();
            let node = pager.get_page(cursor.page_num).unwrap();
            assert_eq!(node::node_type(node), NodeType::Leaf);
            assert_eq!(node::leaf_key(node, cursor.cell_num as usize), id);
        }
    }

    #[test]
    fn test_many_splits_keep_order() {
        let (_dir, mut pager) = test_pager();
        // A low-high zigzag exercises splits of inner and rightmost leaves.
        let mut ids: Vec<u32> = Vec::new();
        for i in 0..100u32 {
            if i % 2 == 0 {
                ids.push(i / 2 + 1);
            } else {
                ids.push(200 - i / 2);
            }
        }
        for &id in &ids {
            insert(&mut pager, id);
        }
        let mut expected = ids.clone();
        expected.sort_unstable();
        assert_eq!(scan_keys(&mut pager), expected);
    }
}
