use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use clap::Parser;
use harvest::variant::TrackSet;
use harvest::{create_output, open_input, open_rewindable_input, Harvest, HarvestConfig, HarvestError, VcfOptions, VcfSelection};
use tracing::info;

/// Companion of `-I`, written beside the filtered alignment.
const REFERENCE_POSITIONS_FILE: &str = "reference_positions.txt";

#[derive(Parser, Debug)]
#[command(
    name = "harvest",
    about = "Convert and query core-genome alignments, variants and trees"
)]
struct Cli {
    /// MAF alignment input.
    #[arg(short = 'a', value_name = "MAF")]
    maf: Option<PathBuf>,
    /// BED filter: `<file>,<filter name>,<description>` (repeatable).
    #[arg(short = 'b', value_name = "BED,NAME,DESC")]
    bed: Vec<BedFilter>,
    /// Backbone interval output.
    #[arg(short = 'B', value_name = "FILE")]
    out_backbone: Option<PathBuf>,
    /// Reference FASTA input.
    #[arg(short = 'f', value_name = "FASTA")]
    fasta: Option<PathBuf>,
    /// Reference FASTA output.
    #[arg(short = 'F', value_name = "FILE")]
    out_fasta: Option<PathBuf>,
    /// Reference GenBank input (repeatable).
    #[arg(short = 'g', value_name = "GENBANK")]
    genbank: Vec<PathBuf>,
    /// Aligned multi-FASTA input.
    #[arg(short = 'm', value_name = "MFA")]
    mfa: Option<PathBuf>,
    /// Aligned multi-FASTA output (concatenated LCBs).
    #[arg(short = 'M', value_name = "FILE")]
    out_mfa: Option<PathBuf>,
    /// Aligned multi-FASTA output without filtered variant columns; the
    /// kept columns' reference coordinates go to `reference_positions.txt`
    /// beside it.
    #[arg(short = 'I', value_name = "FILE")]
    out_filtered_mfa: Option<PathBuf>,
    /// Newick tree input.
    #[arg(short = 'n', value_name = "NEWICK")]
    newick: Option<PathBuf>,
    /// Newick tree output.
    #[arg(short = 'N', value_name = "FILE")]
    out_newick: Option<PathBuf>,
    /// SNP multi-FASTA output.
    #[arg(short = 'S', value_name = "FILE")]
    out_snp: Option<PathBuf>,
    /// 1: scale branch lengths by variants per core base; 0: reset the scale.
    #[arg(short = 'u', value_name = "0|1", value_parser = ["0", "1"])]
    update_branches: Option<String>,
    /// VCF input.
    #[arg(short = 'v', value_name = "VCF")]
    vcf: Option<PathBuf>,
    /// VCF output.
    #[arg(short = 'V', value_name = "FILE")]
    out_vcf: Option<PathBuf>,
    /// Only variants that differ among the tracks (`a,b,c`) or within the
    /// clade under the LCA of two tracks (`a:b`).
    #[arg(long, value_name = "TRACKS", conflicts_with = "signature")]
    internal: Option<TrackQuery>,
    /// Only signature variants of the tracks (`a,b,c`) or of the clade
    /// under the LCA of two tracks (`a:b`).
    #[arg(long, value_name = "TRACKS")]
    signature: Option<TrackQuery>,
    /// XMFA alignment input.
    #[arg(short = 'x', value_name = "XMFA")]
    xmfa: Option<PathBuf>,
    /// XMFA alignment output.
    #[arg(short = 'X', value_name = "FILE")]
    out_xmfa: Option<PathBuf>,
    /// Re-root the tree at its midpoint after loading.
    #[arg(long)]
    midpoint_reroot: bool,
    /// Re-root the tree above this track.
    #[arg(long, value_name = "TRACK")]
    outgroup: Option<String>,
    /// Keep indel columns in the SNP multi-FASTA.
    #[arg(long)]
    indels: bool,
    /// Only log warnings and errors.
    #[arg(short = 'q', long)]
    quiet: bool,
}

/// `--internal` / `--signature` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TrackQuery {
    List(Vec<String>),
    Clade(String, String),
}

impl FromStr for TrackQuery {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let colons = text.matches(':').count();
        if colons > 1 {
            return Err(format!("LCA must only have 2 tracks (\"{text}\")"));
        }
        if colons == 1 {
            if text.contains(',') {
                return Err(format!("cannot use ':' and ',' when specifying tracks (\"{text}\")"));
            }
            let (first, second) = text.split_once(':').unwrap_or((text, ""));
            if first.is_empty() || second.is_empty() {
                return Err(format!("LCA needs two tracks (\"{text}\")"));
            }
            return Ok(TrackQuery::Clade(first.to_string(), second.to_string()));
        }
        let tracks: Vec<String> = text
            .split(',')
            .filter(|track| !track.is_empty())
            .map(str::to_string)
            .collect();
        if tracks.is_empty() {
            return Err("no tracks given".to_string());
        }
        Ok(TrackQuery::List(tracks))
    }
}

/// `-b` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BedFilter {
    file: PathBuf,
    name: String,
    description: String,
}

impl FromStr for BedFilter {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut parts = text.splitn(3, ',');
        let file = parts.next().unwrap_or_default();
        let name = parts
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| format!("no filter name for bed file {file}"))?;
        let description = parts
            .next()
            .ok_or_else(|| format!("no filter description for bed file {file}"))?;
        Ok(BedFilter {
            file: PathBuf::from(file),
            name: name.to_string(),
            description: description.to_string(),
        })
    }
}

impl fmt::Display for BedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.file.display(), self.name, self.description)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet)?;

    let config = HarvestConfig::default().with_derive_variants(cli.vcf.is_none());
    let mut harvest = Harvest::new(config);
    load_inputs(&mut harvest, &cli)?;
    adjust_tree(&mut harvest, &cli)?;
    write_outputs(&harvest, &cli)?;
    Ok(())
}

fn init_tracing(quiet: bool) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .context("invalid log filter")?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
    Ok(())
}

fn load_inputs(harvest: &mut Harvest, cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.mfa {
        info!("loading {}", path.display());
        harvest
            .load_mfa(open_input(path)?)
            .with_context(|| format!("{} does not look like an aligned multi-FASTA file", path.display()))?;
    }

    if let Some(path) = &cli.fasta {
        info!("loading {}", path.display());
        harvest
            .load_fasta(open_input(path)?)
            .with_context(|| format!("failed to read reference from {}", path.display()))?;
    }

    if let Some(path) = &cli.maf {
        info!("loading {}", path.display());
        let reference = cli.fasta.as_deref().map(display_name);
        harvest
            .load_maf(open_rewindable_input(path)?, reference.as_deref())
            .with_context(|| format!("failed to load MAF alignment {}", path.display()))?;
    }

    for path in &cli.genbank {
        info!("loading {}", path.display());
        harvest
            .load_genbank(open_input(path)?, &display_name(path))
            .with_context(|| format!("failed to load GenBank file {}", path.display()))?;
    }

    if let Some(path) = &cli.xmfa {
        info!("loading {}", path.display());
        harvest
            .load_xmfa(open_input(path)?)
            .with_context(|| format!("failed to load XMFA alignment {}", path.display()))?;
    }

    if let Some(path) = &cli.newick {
        info!("loading {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read tree from {}", path.display()))?;
        harvest
            .load_newick(&text)
            .with_context(|| format!("failed to load tree {}", path.display()))?;
    }

    if let Some(path) = &cli.vcf {
        info!("loading {}", path.display());
        harvest
            .load_vcf(open_input(path)?)
            .with_context(|| format!("failed to load VCF {}", path.display()))?;
    }

    for filter in &cli.bed {
        info!("loading {}", filter.file.display());
        harvest
            .load_bed(open_input(&filter.file)?, &filter.name, &filter.description)
            .with_context(|| format!("failed to apply BED filter {filter}"))?;
    }
    Ok(())
}

fn adjust_tree(harvest: &mut Harvest, cli: &Cli) -> Result<()> {
    if cli.midpoint_reroot {
        if harvest.tree().is_empty() {
            bail!("--midpoint-reroot needs a tree (-n)");
        }
        harvest.tree_mut().midpoint_reroot();
    }
    if let Some(track) = &cli.outgroup {
        harvest
            .set_outgroup(track)
            .with_context(|| format!("cannot root the tree at {track}"))?;
    }
    match cli.update_branches.as_deref() {
        Some("1") => harvest.update_multiplier(),
        Some(_) => harvest.clear_multiplier(),
        None => {}
    }
    Ok(())
}

fn write_outputs(harvest: &Harvest, cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.out_fasta {
        write_to(path, |out| harvest.write_fasta(out))?;
    }
    if let Some(path) = &cli.out_mfa {
        write_to(path, |out| harvest.write_mfa(out))?;
    }
    if let Some(path) = &cli.out_filtered_mfa {
        let positions_path = path.with_file_name(REFERENCE_POSITIONS_FILE);
        info!("writing {}", positions_path.display());
        let mut positions = create_output(&positions_path)?;
        write_to(path, |out| harvest.write_filtered_mfa(out, &mut positions).map(|_| ()))?;
        positions
            .flush()
            .with_context(|| format!("failed to write {}", positions_path.display()))?;
    }
    if let Some(path) = &cli.out_newick {
        write_to(path, |out| harvest.write_newick(out, true))?;
    }
    if let Some(path) = &cli.out_snp {
        write_to(path, |out| harvest.write_snp(out, cli.indels))?;
    }
    if let Some(path) = &cli.out_backbone {
        write_to(path, |out| harvest.write_backbone(out))?;
    }
    if let Some(path) = &cli.out_xmfa {
        write_to(path, |out| harvest.write_xmfa(out))?;
    }
    if let Some(path) = &cli.out_vcf {
        let options = VcfOptions {
            indels: true,
            selection: vcf_selection(harvest, cli)?,
        };
        write_to(path, |out| harvest.write_vcf(out, &options).map(|_| ()))?;
    }
    Ok(())
}

fn vcf_selection(harvest: &Harvest, cli: &Cli) -> Result<VcfSelection> {
    let resolve = |query: &TrackQuery| -> Result<TrackSet> {
        let set = match query {
            TrackQuery::List(tracks) => harvest.track_set(tracks.as_slice())?,
            TrackQuery::Clade(first, second) => harvest.clade_set(first, second)?,
        };
        Ok(set)
    };
    Ok(match (&cli.internal, &cli.signature) {
        (Some(query), _) => VcfSelection::Internal(resolve(query)?),
        (None, Some(query)) => VcfSelection::Signature(resolve(query)?),
        (None, None) => VcfSelection::All,
    })
}

fn write_to<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut Box<dyn Write>) -> Result<(), HarvestError>,
{
    info!("writing {}", path.display());
    let mut out = create_output(path)?;
    write(&mut out).with_context(|| format!("failed to write {}", path.display()))?;
    out.flush()
        .with_context(|| format!("failed to write {}", path.display()))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
