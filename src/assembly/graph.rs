//! K-mer de Bruijn graph engine for local re-assembly.
//!
//! Vertices are k-mers interned into a `petgraph` stable graph (node indices
//! act as the integer handles, so removals never dangle); edges carry a read
//! support count and a reference-path flag. Inserting the reference records a
//! walk over the graph; bubbles are divergent non-reference paths anchored on
//! that walk, each spelling out one candidate variant.

use std::collections::hash_map::Entry;

use ahash::{AHashMap, AHashSet};
use anyhow::{anyhow, ensure, Result};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;

use crate::utils::errors::VarforgeError;

/// Smallest k-mer size the graph can be built with.
pub const MIN_KMER_SIZE: usize = 4;

/// Cap on bubble paths explored per divergence point. Generous enough that
/// any realistic local graph enumerates completely.
const MAX_BUBBLE_PATHS: usize = 1024;

/// A variant relative to the reference window the assembler was given:
/// `offset` indexes into that window, not the genome.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AssemblyVariant {
    pub offset: usize,
    pub ref_allele: String,
    pub alt_allele: String,
}

#[derive(Debug, Clone, Default)]
struct KmerEdge {
    support: u32,
    on_reference: bool,
}

/// De Bruijn graph over the k-mers of one reference window and the reads
/// mapped near it.
#[derive(Debug)]
pub struct Assembler {
    k: usize,
    graph: StableDiGraph<Box<[u8]>, KmerEdge>,
    vertices: AHashMap<Box<[u8]>, NodeIndex>,
    // The reference walk, in window order. A k-mer repeated in the window
    // appears here once per occurrence.
    reference_path: Vec<NodeIndex>,
}

impl Assembler {
    pub fn new(k: usize) -> Result<Self> {
        ensure!(
            k >= MIN_KMER_SIZE,
            "k-mer size {k} is below the minimum of {MIN_KMER_SIZE}"
        );
        Ok(Self {
            k,
            graph: StableDiGraph::default(),
            vertices: AHashMap::new(),
            reference_path: Vec::new(),
        })
    }

    pub fn with_reference(k: usize, reference: &[u8]) -> Result<Self> {
        let mut assembler = Self::new(k)?;
        assembler.insert_reference(reference)?;
        Ok(assembler)
    }

    pub fn kmer_size(&self) -> usize {
        self.k
    }

    /// Record the reference walk. Every consecutive k-mer becomes a vertex
    /// and every consecutive pair an edge flagged on-reference.
    ///
    /// May be called once per graph lifetime ([`Assembler::clear`] resets
    /// that). The reference must be pure A/C/G/T — windows containing 'N'
    /// are rejected upstream.
    pub fn insert_reference(&mut self, bases: &[u8]) -> Result<()> {
        ensure!(
            self.reference_path.is_empty(),
            "reference already inserted at k={}",
            self.k
        );
        ensure!(
            bases.len() >= self.k,
            "reference of {} bases is shorter than k={}",
            bases.len(),
            self.k
        );
        check_bases(bases, false)?;

        self.reference_path.reserve(bases.len() - self.k + 1);
        let mut prev: Option<NodeIndex> = None;
        for window in bases.windows(self.k) {
            let vertex = self.intern(window);
            if let Some(source) = prev {
                let edge = self.edge_between(source, vertex);
                self.graph[edge].on_reference = true;
            }
            self.reference_path.push(vertex);
            prev = Some(vertex);
        }
        Ok(())
    }

    /// Walk a read's k-mers into the graph, incrementing edge support.
    /// 'N' bases break the walk: no edge ever crosses one.
    pub fn insert_read(&mut self, bases: &[u8]) -> Result<()> {
        ensure!(
            bases.len() >= self.k,
            "read of {} bases is shorter than k={}",
            bases.len(),
            self.k
        );
        check_bases(bases, true)?;

        let mut prev: Option<NodeIndex> = None;
        for window in bases.windows(self.k) {
            if window.contains(&b'N') {
                prev = None;
                continue;
            }
            let vertex = self.intern(window);
            if let Some(source) = prev {
                let edge = self.edge_between(source, vertex);
                self.graph[edge].support += 1;
            }
            prev = Some(vertex);
        }
        Ok(())
    }

    /// Drop non-reference self-loops and 2-cycles. Short tandem repeats in
    /// reads produce these and they would otherwise trap the bubble search.
    pub fn remove_trivial_nonreference_cycles(&mut self) {
        let doomed: Vec<EdgeIndex> = self
            .graph
            .edge_references()
            .filter(|edge| !edge.weight().on_reference)
            .filter(|edge| {
                edge.source() == edge.target()
                    || self.graph.find_edge(edge.target(), edge.source()).is_some()
            })
            .map(|edge| edge.id())
            .collect();
        for edge in doomed {
            self.graph.remove_edge(edge);
        }
    }

    /// Drop weakly supported non-reference edges, then every vertex not on a
    /// path from the reference head to the reference tail.
    ///
    /// Returns whether this k resolved the window: the graph is non-empty and
    /// the reference walk is intact and usable. A reference walk that
    /// revisits a k-mer within two steps is a period-1 or period-2 tandem
    /// repeat, which no bubble anchored there can span at this k; the caller
    /// should retry with a larger one.
    pub fn prune(&mut self, min_support: u32) -> bool {
        if self.reference_path.is_empty() {
            return false;
        }

        let weak: Vec<EdgeIndex> = self
            .graph
            .edge_references()
            .filter(|edge| !edge.weight().on_reference && edge.weight().support < min_support)
            .map(|edge| edge.id())
            .collect();
        for edge in weak {
            self.graph.remove_edge(edge);
        }

        let head = self.reference_path[0];
        let tail = self.reference_path[self.reference_path.len() - 1];
        let from_head = self.reachable(head, Direction::Outgoing);
        let to_tail = self.reachable(tail, Direction::Incoming);
        let dead: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|vertex| !(from_head.contains(vertex) && to_tail.contains(vertex)))
            .collect();
        for vertex in dead {
            self.graph.remove_node(vertex);
        }
        let graph = &self.graph;
        self.vertices.retain(|_, vertex| graph.contains_node(*vertex));

        self.graph.node_count() > 0 && !self.reference_walk_has_trivial_cycle()
    }

    /// Enumerate bubbles against the reference walk and spell each one out as
    /// a window-relative variant. Output is sorted and deduplicated.
    pub fn extract_variants(&self) -> Result<Vec<AssemblyVariant>> {
        if self.reference_path.is_empty() {
            return Ok(Vec::new());
        }

        let mut reference_positions: AHashMap<NodeIndex, Vec<usize>> = AHashMap::new();
        for (position, &vertex) in self.reference_path.iter().enumerate() {
            reference_positions.entry(vertex).or_default().push(position);
        }

        // Best alt path per (start, end) anchor pair: highest support wins,
        // ties go to the lexicographically smallest alt sequence.
        let mut bubbles: AHashMap<(usize, usize), (u32, String)> = AHashMap::new();
        let mut visited = AHashSet::new();
        for &anchor in &self.reference_path {
            if !visited.insert(anchor) {
                continue;
            }
            for edge in self.graph.edges_directed(anchor, Direction::Outgoing) {
                if edge.weight().on_reference {
                    continue;
                }
                self.walk_bubble_paths(
                    anchor,
                    edge.target(),
                    edge.weight().support,
                    &reference_positions,
                    &mut bubbles,
                )?;
            }
        }

        let mut variants = Vec::with_capacity(bubbles.len());
        for ((start, end), (_, alt_allele)) in bubbles {
            let ref_allele = self.spell(&self.reference_path[start..=end])?;
            variants.push(AssemblyVariant {
                offset: start,
                ref_allele,
                alt_allele,
            });
        }
        variants.sort_unstable();
        variants.dedup();
        Ok(variants)
    }

    /// Drop all graph state, keeping only the k-mer size.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.vertices.clear();
        self.reference_path.clear();
    }

    fn intern(&mut self, kmer: &[u8]) -> NodeIndex {
        if let Some(&vertex) = self.vertices.get(kmer) {
            return vertex;
        }
        let vertex = self.graph.add_node(kmer.into());
        self.vertices.insert(kmer.into(), vertex);
        vertex
    }

    fn edge_between(&mut self, source: NodeIndex, target: NodeIndex) -> EdgeIndex {
        match self.graph.find_edge(source, target) {
            Some(edge) => edge,
            None => self.graph.add_edge(source, target, KmerEdge::default()),
        }
    }

    fn reachable(&self, start: NodeIndex, direction: Direction) -> AHashSet<NodeIndex> {
        let mut seen = AHashSet::new();
        let mut stack = vec![start];
        seen.insert(start);
        while let Some(vertex) = stack.pop() {
            for next in self.graph.neighbors_directed(vertex, direction) {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        seen
    }

    fn reference_walk_has_trivial_cycle(&self) -> bool {
        self.reference_path.windows(2).any(|pair| pair[0] == pair[1])
            || self.reference_path.windows(3).any(|triple| triple[0] == triple[2])
    }

    /// Depth-first enumeration of simple paths leaving `anchor` through
    /// non-reference vertices until they rejoin the reference walk.
    fn walk_bubble_paths(
        &self,
        anchor: NodeIndex,
        first: NodeIndex,
        first_support: u32,
        reference_positions: &AHashMap<NodeIndex, Vec<usize>>,
        bubbles: &mut AHashMap<(usize, usize), (u32, String)>,
    ) -> Result<()> {
        let max_path_len = self.reference_path.len() + self.k;
        let mut rejoined = 0usize;
        let mut stack: Vec<(Vec<NodeIndex>, u32)> = vec![(vec![first], first_support)];

        while let Some((path, support)) = stack.pop() {
            let Some(&tip) = path.last() else { continue };

            if reference_positions.contains_key(&tip) {
                self.record_bubble(anchor, &path, support, reference_positions, bubbles)?;
                rejoined += 1;
                if rejoined >= MAX_BUBBLE_PATHS {
                    break;
                }
                continue;
            }
            if path.len() > max_path_len {
                continue;
            }
            for edge in self.graph.edges_directed(tip, Direction::Outgoing) {
                let next = edge.target();
                if next == anchor || path.contains(&next) {
                    continue;
                }
                let mut extended = path.clone();
                extended.push(next);
                stack.push((extended, support.min(edge.weight().support)));
            }
        }
        Ok(())
    }

    /// Anchor a rejoined path onto the reference walk and keep the best alt
    /// per anchor pair.
    ///
    /// A k-mer repeated in the window occupies several walk positions, so the
    /// anchor pair is chosen as the one whose reference span length is
    /// closest to the alt path length (the alignment with the fewest implied
    /// edits), ties resolved towards the leftmost pair.
    fn record_bubble(
        &self,
        anchor: NodeIndex,
        path: &[NodeIndex],
        support: u32,
        reference_positions: &AHashMap<NodeIndex, Vec<usize>>,
        bubbles: &mut AHashMap<(usize, usize), (u32, String)>,
    ) -> Result<()> {
        let (Some(&rejoin), Some(starts)) = (path.last(), reference_positions.get(&anchor)) else {
            return Ok(());
        };
        let Some(ends) = reference_positions.get(&rejoin) else {
            return Ok(());
        };

        let alt_len = self.k + path.len();
        let mut choice: Option<(usize, usize, usize)> = None;
        for &start in starts {
            for &end in ends {
                if end <= start {
                    continue;
                }
                let span_len = end - start + self.k;
                let candidate = (span_len.abs_diff(alt_len), start, end);
                if choice.map_or(true, |best| candidate < best) {
                    choice = Some(candidate);
                }
            }
        }
        let Some((_, start, end)) = choice else {
            return Ok(());
        };

        let mut walk = Vec::with_capacity(path.len() + 1);
        walk.push(anchor);
        walk.extend_from_slice(path);
        let alt_allele = self.spell(&walk)?;

        match bubbles.entry((start, end)) {
            Entry::Occupied(mut slot) => {
                let best = slot.get_mut();
                if support > best.0 || (support == best.0 && alt_allele < best.1) {
                    *best = (support, alt_allele);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert((support, alt_allele));
            }
        }
        Ok(())
    }

    /// Spell the bases of a vertex walk: the first k-mer in full, then one
    /// base per subsequent vertex.
    fn spell(&self, walk: &[NodeIndex]) -> Result<String> {
        let Some((&head, rest)) = walk.split_first() else {
            return Ok(String::new());
        };
        let mut bases = Vec::with_capacity(self.k + rest.len());
        bases.extend_from_slice(&self.graph[head]);
        for &vertex in rest {
            let kmer = &self.graph[vertex];
            bases.push(kmer[kmer.len() - 1]);
        }
        String::from_utf8(bases).map_err(|_| anyhow!("graph holds non-ASCII k-mer bases"))
    }
}

fn check_bases(bases: &[u8], allow_n: bool) -> Result<()> {
    for (position, &base) in bases.iter().enumerate() {
        let legal = matches!(base, b'A' | b'C' | b'G' | b'T') || (allow_n && base == b'N');
        if !legal {
            return Err(VarforgeError::IllegalBase { base, position }.into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler_with(reference: &str, reads: &[&str], k: usize) -> Assembler {
        let mut assembler = Assembler::with_reference(k, reference.as_bytes()).unwrap();
        for read in reads {
            assembler.insert_read(read.as_bytes()).unwrap();
        }
        assembler
    }

    #[test]
    fn rejects_small_k() {
        assert!(Assembler::new(3).is_err());
        assert!(Assembler::new(4).is_ok());
    }

    #[test]
    fn rejects_illegal_bases() {
        let mut assembler = Assembler::new(4).unwrap();
        let err = assembler.insert_read(b"ACGUACGT").unwrap_err();
        let err = err.downcast::<VarforgeError>().unwrap();
        assert_eq!(
            err,
            VarforgeError::IllegalBase {
                base: b'U',
                position: 3
            }
        );
        // 'N' is legal in reads but not in the reference
        assert!(assembler.insert_read(b"ACGTNACGT").is_ok());
        assert!(assembler.insert_reference(b"ACGTNACGT").is_err());
    }

    #[test]
    fn rejects_short_sequences() {
        let mut assembler = Assembler::new(5).unwrap();
        assert!(assembler.insert_read(b"ACGT").is_err());
        assert!(assembler.insert_reference(b"ACGT").is_err());
    }

    #[test]
    fn reference_may_only_be_inserted_once_per_lifetime() {
        let mut assembler = Assembler::with_reference(4, b"ACGTTGCA").unwrap();
        assert!(assembler.insert_reference(b"ACGTTGCA").is_err());
        assembler.clear();
        assert!(assembler.insert_reference(b"ACGTTGCA").is_ok());
    }

    #[test]
    fn n_breaks_the_read_walk() {
        // The N-spanning k-mers contribute no vertices or edges, so the read
        // adds nothing that could form a bubble.
        let mut assembler = assembler_with("CCATGGACTT", &["CCATGNGACTT"], 4);
        assembler.remove_trivial_nonreference_cycles();
        assert!(assembler.prune(1));
        assert!(assembler.extract_variants().unwrap().is_empty());
    }

    #[test]
    fn finds_a_simple_snv_bubble() {
        // TGGA -> TGCA at the centre of an otherwise matching read
        let reference = "AACCTGGATTCG";
        let read = "AACCTGCATTCG";
        let mut assembler = assembler_with(reference, &[read, read, read], 4);
        assembler.remove_trivial_nonreference_cycles();
        assert!(assembler.prune(3));
        let variants = assembler.extract_variants().unwrap();
        assert_eq!(variants.len(), 1);
        let variant = &variants[0];
        // alleles are still untrimmed at this layer: the bubble spans the
        // anchoring k-mers on both sides
        assert_eq!(
            (variant.offset, variant.ref_allele.as_str(), variant.alt_allele.as_str()),
            (2, "CCTGGATTC", "CCTGCATTC")
        );
    }

    #[test]
    fn prune_drops_unsupported_bubbles() {
        let reference = "AACCTGGATTCG";
        let read = "AACCTGCATTCG";
        let mut assembler = assembler_with(reference, &[read, read], 4);
        assembler.remove_trivial_nonreference_cycles();
        assert!(assembler.prune(3));
        assert!(assembler.extract_variants().unwrap().is_empty());
    }

    #[test]
    fn dinucleotide_repeat_reference_fails_prune() {
        // ATAT... repeats every 2 bases, so the reference walk revisits each
        // k-mer two steps later
        let reference = "CCGGATATATATATGGCC";
        let mut assembler = assembler_with(reference, &[reference], 4);
        assembler.remove_trivial_nonreference_cycles();
        assert!(!assembler.prune(1));
    }

    #[test]
    fn period_four_repeat_reference_is_fine() {
        let reference = "TTACAGGCACGTACGTACTTGG";
        let mut assembler = assembler_with(reference, &[reference], 4);
        assembler.remove_trivial_nonreference_cycles();
        assert!(assembler.prune(1));
    }

    #[test]
    fn trivial_cycle_removal_spares_reference_edges() {
        let mut assembler = Assembler::with_reference(4, b"CCGGATATATATATGGCC").unwrap();
        // a read-only 2-cycle: CGCG <-> GCGC
        assembler.insert_read(b"TTCGCGCGTT").unwrap();
        assembler.remove_trivial_nonreference_cycles();
        // the repeat edges inserted by the reference must survive removal;
        // prune still reports failure because of the reference repeat itself
        assert!(!assembler.prune(0));
    }

    #[test]
    fn clear_releases_graph_state() {
        let mut assembler = assembler_with("AACCTGGATTCG", &["AACCTGCATTCG"], 4);
        assembler.clear();
        assert_eq!(assembler.kmer_size(), 4);
        assert!(!assembler.prune(0));
    }
}
