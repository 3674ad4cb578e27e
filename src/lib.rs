//! # harvest
//!
//! Comparative-genomics engine: loads core-genome alignments (MAF, XMFA,
//! aligned multi-FASTA), reference sequences (FASTA, GenBank), variant
//! calls (VCF), filter intervals (BED) and a phylogeny (Newick) into one
//! in-memory model, derives SNP and indel calls, and re-emits the model in
//! any of those formats.
//!
//! ## Model
//!
//! 1. [`ReferenceList`]: reference sequences addressed by id, with a
//!    concatenated coordinate space.
//! 2. [`TrackList`]: the aligned genomes; track 0 is the reference.
//! 3. [`LcbList`]: non-overlapping locally collinear blocks anchored on the
//!    reference.
//! 4. [`VariantList`]: variant columns with a bitmask of provenance filters.
//! 5. [`PhylogenyTree`]: a rooted tree whose leaves are tracks.
//!
//! ## Usage Example
//!
//! ```ignore
//! use harvest::{Harvest, HarvestConfig};
//!
//! let mut harvest = Harvest::new(HarvestConfig::default());
//! harvest.load_newick(&std::fs::read_to_string("tree.nwk")?)?;
//! harvest.load_xmfa(harvest::open_input("parsnp.xmfa")?)?;
//! harvest.tree_mut().midpoint_reroot();
//! harvest.write_vcf(&mut std::io::stdout(), &Default::default())?;
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod alignment; // LCB backbone, scanners and emitters
pub mod genomics; // references, tracks, annotations
pub mod tree; // arena phylogeny and Newick
pub mod util; // cursor and number formatting
pub mod variant; // variant calling, filters, VCF/BED/SNP I/O

pub use alignment::{AlignmentError, Lcb, LcbList, Region};
pub use genomics::{AnnotationList, Reference, ReferenceList, Track, TrackList};
pub use tree::{NodeId, PhylogenyTree, TreeError};
pub use variant::{CallerConfig, Variant, VariantError, VariantList, VcfOptions, VcfSelection};

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use alignment::{maf, mfa, xmfa, AlignmentBlock, LcbBuilder, TrackMode, FASTA_WIDTH};
use genomics::{basename_stem, AnnotationError, ReferenceError, TrackError};
use variant::TrackSet;

/// Path that stands for stdin or stdout.
pub const STDIO_PATH: &str = "-";

/// Errors surfaced by the orchestrator.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// A file could not be opened or created.
    #[error("failed to open {}: {source}", path.display())]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// Reading or writing an open stream failed.
    #[error("I/O failed: {0}")]
    Stream(#[from] io::Error),

    /// Alignment input was rejected.
    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    /// Variant input or filtering failed.
    #[error(transparent)]
    Variant(#[from] VariantError),

    /// Tree input was rejected.
    #[error(transparent)]
    Tree(#[from] TreeError),

    /// GenBank input was rejected.
    #[error(transparent)]
    Annotation(#[from] AnnotationError),

    /// A reference name did not resolve.
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    /// A track name did not resolve.
    #[error(transparent)]
    Track(#[from] TrackError),

    /// An operation needs a tree and none is loaded.
    #[error("no tree loaded")]
    NoTree,

    /// A track exists but is not a leaf of the loaded tree.
    #[error("track \"{0}\" is not a leaf of the loaded tree")]
    NotInTree(String),
}

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestConfig {
    /// Window filters applied while deriving variants.
    pub caller: CallerConfig,
    /// Derive variants from alignments as they load. Turn off when the
    /// variants come from a VCF instead.
    pub derive_variants: bool,
    /// Bases per line in reference FASTA output.
    pub fasta_width: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            caller: CallerConfig::default(),
            derive_variants: true,
            fasta_width: FASTA_WIDTH,
        }
    }
}

impl HarvestConfig {
    /// Use `caller` for variant derivation.
    pub fn with_caller(mut self, caller: CallerConfig) -> Self {
        self.caller = caller;
        self
    }

    /// Enable or disable variant derivation during alignment loads.
    pub fn with_derive_variants(mut self, derive: bool) -> Self {
        self.derive_variants = derive;
        self
    }

    /// Set the FASTA line width; `0` is rejected.
    pub fn with_fasta_width(mut self, width: usize) -> Result<Self, HarvestError> {
        if width == 0 {
            return Err(HarvestError::Variant(VariantError::InvalidConfig(
                "FASTA line width must be positive".to_string(),
            )));
        }
        self.fasta_width = width;
        Ok(self)
    }
}

/// Open `path` for reading; [`STDIO_PATH`] reads stdin.
pub fn open_input(path: impl AsRef<Path>) -> Result<Box<dyn BufRead>, HarvestError> {
    let path = path.as_ref();
    if path == Path::new(STDIO_PATH) {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(path).map_err(|source| HarvestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Box::new(BufReader::new(file)))
}

/// Buffered input that can be rewound for a second pass.
pub trait RewindableInput: BufRead + Seek {}

impl<T: BufRead + Seek> RewindableInput for T {}

/// Open `path` for two-pass reading. Stdin cannot seek, so
/// [`STDIO_PATH`] is read into memory first.
pub fn open_rewindable_input(path: impl AsRef<Path>) -> Result<Box<dyn RewindableInput>, HarvestError> {
    let path = path.as_ref();
    let io_error = |source| HarvestError::Io {
        path: path.to_path_buf(),
        source,
    };
    if path == Path::new(STDIO_PATH) {
        let mut bytes = Vec::new();
        io::stdin().read_to_end(&mut bytes).map_err(io_error)?;
        return Ok(Box::new(Cursor::new(bytes)));
    }
    let file = File::open(path).map_err(io_error)?;
    Ok(Box::new(BufReader::new(file)))
}

/// Create `path` for writing; [`STDIO_PATH`] writes stdout.
pub fn create_output(path: impl AsRef<Path>) -> Result<Box<dyn Write>, HarvestError> {
    let path = path.as_ref();
    if path == Path::new(STDIO_PATH) {
        return Ok(Box::new(BufWriter::new(io::stdout())));
    }
    let file = File::create(path).map_err(|source| HarvestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Box::new(BufWriter::new(file)))
}

/// The loaded model and every load and write operation on it.
///
/// Loads follow the dependency order of the model: references and tracks
/// first, then alignments (which derive variants), then trees, VCF and BED
/// filters. A tree loaded before an alignment fixes the track order; the
/// alignment's track names are remapped onto it.
#[derive(Debug, Default)]
pub struct Harvest {
    config: HarvestConfig,
    references: ReferenceList,
    tracks: TrackList,
    lcbs: LcbList,
    variants: VariantList,
    tree: PhylogenyTree,
    annotations: AnnotationList,
}

impl Harvest {
    /// Empty model.
    pub fn new(config: HarvestConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Active settings.
    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Loaded references.
    pub fn references(&self) -> &ReferenceList {
        &self.references
    }

    /// Loaded tracks.
    pub fn tracks(&self) -> &TrackList {
        &self.tracks
    }

    /// Alignment backbone.
    pub fn lcbs(&self) -> &LcbList {
        &self.lcbs
    }

    /// Variant columns.
    pub fn variants(&self) -> &VariantList {
        &self.variants
    }

    /// Phylogeny.
    pub fn tree(&self) -> &PhylogenyTree {
        &self.tree
    }

    /// Phylogeny, for re-rooting.
    pub fn tree_mut(&mut self) -> &mut PhylogenyTree {
        &mut self.tree
    }

    /// Gene annotations.
    pub fn annotations(&self) -> &AnnotationList {
        &self.annotations
    }

    /// Append the records of a FASTA file to the references.
    pub fn load_fasta<R: BufRead>(&mut self, reader: R) -> Result<usize, HarvestError> {
        let count = self.references.read_fasta(reader)?;
        info!(references = count, total = self.references.total_len(), "loaded FASTA");
        Ok(count)
    }

    /// Load gene annotations. Without loaded references, each record's
    /// sequence becomes a reference.
    pub fn load_genbank<R: BufRead>(&mut self, reader: R, file: &str) -> Result<usize, HarvestError> {
        let create = self.references.is_empty();
        let count = self
            .annotations
            .read_genbank(reader, file, &mut self.references, create)?;
        info!(file, annotations = count, "loaded GenBank");
        Ok(count)
    }

    /// Load a MAF alignment. `reference_file` names the FASTA the
    /// references came from; its stem is the reference track.
    pub fn load_maf<R: BufRead + Seek>(&mut self, reader: R, reference_file: Option<&str>) -> Result<usize, HarvestError> {
        let blocks = maf::CoreBlocks::new(reader)?;
        self.build_lcbs(blocks, |builder| {
            if let Some(file) = reference_file {
                builder.resolve_track(basename_stem(file))?;
            }
            Ok(())
        })
    }

    /// Load an XMFA alignment. Tracks are declared in header order with
    /// their names and lengths.
    pub fn load_xmfa<R: BufRead>(&mut self, reader: R) -> Result<usize, HarvestError> {
        let alignment = xmfa::read(reader)?;
        let sequences = alignment.sequences;
        self.build_lcbs(alignment.blocks.into_iter().map(Ok), |builder| {
            for sequence in &sequences {
                builder.declare_track(&sequence.file, sequence.header.as_deref(), sequence.length)?;
            }
            Ok(())
        })
    }

    /// Load an aligned multi-FASTA file as a single block. The first
    /// record replaces any loaded reference.
    pub fn load_mfa<R: BufRead>(&mut self, reader: R) -> Result<usize, HarvestError> {
        let alignment = mfa::read(reader)?;
        self.references.clear();
        let accepted = self.build_lcbs([Ok(alignment.block)], |_| Ok(()))?;
        if let Some(reference) = self.references.get_mut(0) {
            reference.name = alignment.reference_name;
            reference.description = alignment.reference_description;
        }
        Ok(accepted)
    }

    fn build_lcbs<I, F>(&mut self, blocks: I, prepare: F) -> Result<usize, HarvestError>
    where
        I: IntoIterator<Item = Result<AlignmentBlock, AlignmentError>>,
        F: FnOnce(&mut LcbBuilder<'_>) -> Result<(), TrackError>,
    {
        let mode = if self.tree.is_empty() {
            TrackMode::Fresh
        } else {
            TrackMode::Remap(&mut self.tree)
        };
        let mut builder = LcbBuilder::new(&mut self.references, &mut self.tracks, mode);
        if self.config.derive_variants {
            builder = builder.with_variants(&mut self.variants, self.config.caller.clone());
        }
        prepare(&mut builder)?;
        for block in blocks {
            builder.add_block(block?)?;
        }
        self.lcbs = builder.finish()?;
        if !self.config.derive_variants {
            self.variants.init();
        }
        info!(
            lcbs = self.lcbs.len(),
            tracks = self.tracks.len(),
            variants = self.variants.len(),
            "loaded alignment"
        );
        Ok(self.lcbs.len())
    }

    /// Load a Newick tree. Leaf labels create tracks when none are loaded
    /// and must name loaded tracks otherwise.
    pub fn load_newick(&mut self, text: &str) -> Result<usize, HarvestError> {
        self.tree = tree::newick::parse(text, &mut self.tracks)?;
        info!(leaves = self.tree.leaves().len(), "loaded tree");
        Ok(self.tree.leaves().len())
    }

    /// Replace the variants with the records of a VCF file. Without an
    /// alignment, one block spanning the reference is assumed.
    pub fn load_vcf<R: BufRead>(&mut self, reader: R) -> Result<usize, HarvestError> {
        let count = self
            .variants
            .read_vcf(reader, &mut self.references, &mut self.tracks)?;
        if self.lcbs.is_empty() {
            let lengths = vec![self.references.total_len(); self.tracks.len()];
            self.lcbs = LcbList::single(&self.references, &lengths);
            debug!(length = self.references.total_len(), "assuming whole-reference alignment");
        }
        info!(variants = count, filters = self.variants.filters().len(), "loaded VCF");
        Ok(count)
    }

    /// Register a filter from BED intervals. Returns its flag.
    pub fn load_bed<R: BufRead>(&mut self, reader: R, name: &str, description: &str) -> Result<u64, HarvestError> {
        let intervals = variant::bed::read_bed(reader, &self.references)?;
        let flag = self.variants.add_filter_from_bed(&intervals, name, description)?;
        info!(name, intervals = intervals.len(), flag, "loaded BED filter");
        Ok(flag)
    }

    /// Scale Newick branch lengths by variants per core base, unless a
    /// multiplier is already set or nothing is aligned.
    pub fn update_multiplier(&mut self) {
        let core = self.lcbs.core_size();
        if self.tree.multiplier() == 1.0 && core > 0 {
            let mult = self.variants.len() as f64 / core as f64;
            self.tree.set_multiplier(mult);
            debug!(mult, "updated branch multiplier");
        }
    }

    /// Reset the Newick multiplier to 1.
    pub fn clear_multiplier(&mut self) {
        self.tree.set_multiplier(1.0);
    }

    /// Re-root above the leaf of the track named `file`.
    pub fn set_outgroup(&mut self, file: &str) -> Result<(), HarvestError> {
        let leaf = self.leaf_by_file(file)?;
        self.tree.set_outgroup(leaf);
        Ok(())
    }

    /// Tracks named in `files`.
    pub fn track_set<S: AsRef<str>>(&self, files: &[S]) -> Result<TrackSet, HarvestError> {
        let members = files
            .iter()
            .map(|file| self.tracks.index_by_file(file.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TrackSet::from_tracks(self.tracks.len(), members))
    }

    /// Tracks under the lowest common ancestor of two named tracks.
    pub fn clade_set(&self, file1: &str, file2: &str) -> Result<TrackSet, HarvestError> {
        let track1 = self.tracks.index_by_file(file1)?;
        let track2 = self.tracks.index_by_file(file2)?;
        self.leaf_by_file(file1)?;
        self.leaf_by_file(file2)?;
        let lca = self.tree.lca(track1, track2);
        Ok(TrackSet::from_clade(&self.tree, lca, self.tracks.len()))
    }

    fn leaf_by_file(&self, file: &str) -> Result<NodeId, HarvestError> {
        if self.tree.is_empty() {
            return Err(HarvestError::NoTree);
        }
        let track = self.tracks.index_by_file(file)?;
        self.tree
            .leaf_for_track(track)
            .ok_or_else(|| HarvestError::NotInTree(file.to_string()))
    }

    /// Write the references as FASTA.
    pub fn write_fasta<W: Write>(&self, out: &mut W) -> Result<(), HarvestError> {
        self.references.write_fasta(out, self.config.fasta_width)?;
        Ok(())
    }

    /// Write the alignment as XMFA.
    pub fn write_xmfa<W: Write>(&self, out: &mut W) -> Result<(), HarvestError> {
        self.lcbs
            .write_xmfa(out, &self.references, &self.tracks, &self.variants)?;
        Ok(())
    }

    /// Write the concatenated alignment as multi-FASTA.
    pub fn write_mfa<W: Write>(&self, out: &mut W) -> Result<(), HarvestError> {
        self.lcbs
            .write_mfa(out, &self.references, &self.tracks, &self.variants)?;
        Ok(())
    }

    /// Write the concatenated alignment without filtered variant columns,
    /// and the reference coordinate of every kept column to `positions`.
    pub fn write_filtered_mfa<W: Write, P: Write>(&self, out: &mut W, positions: &mut P) -> Result<usize, HarvestError> {
        let columns = self.lcbs.write_filtered_mfa(
            out,
            positions,
            &self.references,
            &self.tracks,
            &self.variants,
        )?;
        Ok(columns)
    }

    /// Write the backbone table.
    pub fn write_backbone<W: Write>(&self, out: &mut W) -> Result<(), HarvestError> {
        self.lcbs.write_backbone(out, &self.tracks)?;
        Ok(())
    }

    /// Write filter-passing variant columns as multi-FASTA.
    pub fn write_snp<W: Write>(&self, out: &mut W, indels: bool) -> Result<(), HarvestError> {
        self.variants.write_snp_mfa(out, indels, &self.tracks)?;
        Ok(())
    }

    /// Write selected variants as VCF. Returns the number of rows.
    pub fn write_vcf<W: Write>(&self, out: &mut W, options: &VcfOptions) -> Result<usize, HarvestError> {
        let rows = self.variants.write_vcf(
            out,
            &self.references,
            &self.tracks,
            &self.annotations,
            options,
        )?;
        Ok(rows)
    }

    /// Write the tree as Newick, scaled by the multiplier when `use_mult`.
    pub fn write_newick<W: Write>(&self, out: &mut W, use_mult: bool) -> Result<(), HarvestError> {
        if self.tree.is_empty() {
            return Err(HarvestError::NoTree);
        }
        self.tree.write_newick(out, &self.tracks, use_mult)?;
        Ok(())
    }
}
