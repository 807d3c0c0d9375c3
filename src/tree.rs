//! Huffman coding tree for hierarchical softmax.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub parent: Option<usize>,
    pub left: Option<usize>,
    pub right: Option<usize>,
    pub count: u64,
    /// True if this node is the right child of its parent.
    pub binary: bool,
}

/// A binary tree with one leaf per output class.
///
/// Nodes `0..osz` are the leaves, in class order. Nodes `osz..2*osz-1` are
/// the internal nodes; internal node `n` owns output-matrix row `n - osz`.
/// The last node is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HuffmanTree {
    osz: usize,
    nodes: Vec<Node>,
    /// For each class, the output rows of the internal nodes on the way from
    /// the leaf up to the root.
    paths: Vec<Vec<usize>>,
    /// For each class, the branch taken at each node of `paths`.
    codes: Vec<Vec<bool>>,
}

impl HuffmanTree {
    /// Build the tree from class counts, which must be sorted in descending
    /// order (as dictionary counts are).
    ///
    /// Frequent classes get short codes. Construction is the classic two-queue
    /// merge: the leaves are consumed from the least frequent end, merged
    /// nodes are produced in nondecreasing order, and on a tie the merged node
    /// wins. Equal counts therefore always produce the same tree.
    #[allow(clippy::needless_range_loop)]
    pub fn new(counts: &[u64]) -> Self {
        let osz = counts.len();
        assert!(osz > 0, "can't build a tree with no leaves");
        let mut nodes = vec![
            Node {
                parent: None,
                left: None,
                right: None,
                count: u64::MAX / 2,
                binary: false,
            };
            2 * osz - 1
        ];
        for (node, &count) in nodes.iter_mut().zip(counts) {
            node.count = count;
        }

        // `leaf` walks down from the rarest leaf; `node` walks up through the
        // merged nodes.
        let mut leaf = osz as isize - 1;
        let mut node = osz;
        for i in osz..(2 * osz - 1) {
            let mut mini = [0usize; 2];
            for slot in &mut mini {
                if leaf >= 0 && nodes[leaf as usize].count < nodes[node].count {
                    *slot = leaf as usize;
                    leaf -= 1;
                } else {
                    *slot = node;
                    node += 1;
                }
            }
            nodes[i].left = Some(mini[0]);
            nodes[i].right = Some(mini[1]);
            nodes[i].count = nodes[mini[0]].count + nodes[mini[1]].count;
            nodes[mini[0]].parent = Some(i);
            nodes[mini[1]].parent = Some(i);
            nodes[mini[1]].binary = true;
        }

        let mut paths = Vec::with_capacity(osz);
        let mut codes = Vec::with_capacity(osz);
        for i in 0..osz {
            let mut path = vec![];
            let mut code = vec![];
            let mut j = i;
            while let Some(parent) = nodes[j].parent {
                path.push(parent - osz);
                code.push(nodes[j].binary);
                j = parent;
            }
            paths.push(path);
            codes.push(code);
        }

        HuffmanTree {
            osz,
            nodes,
            paths,
            codes,
        }
    }

    /// Number of leaves.
    pub fn leaves(&self) -> usize {
        self.osz
    }

    pub fn root(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn node(&self, n: usize) -> &Node {
        &self.nodes[n]
    }

    pub fn is_leaf(&self, n: usize) -> bool {
        n < self.osz
    }

    /// Output rows visited on the way from `class` to the root.
    pub fn path(&self, class: usize) -> &[usize] {
        &self.paths[class]
    }

    /// Branch directions matching [`path`](Self::path).
    pub fn code(&self, class: usize) -> &[bool] {
        &self.codes[class]
    }
}
