use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ScrapeError;
use crate::fs_util::normalize_lexically;

/// Species names accepted by IMGT/GENE-DB, in the casing the database uses.
pub const KNOWN_SPECIES: &[&str] = &[
    "Homo sapiens",
    "Mus",
    "Bos taurus",
    "Ovis aries",
    "Danio rerio",
    "Canis lupus familiaris",
    "Macaca mulatta",
    "Tursiops truncatus",
    "Oryctolagus cuniculus",
    "Heterocephalus glaber",
];

const TCR_SEGMENTS: &[&str] = &[
    "TRBV", "TRBJ", "TRBD", "TRAV", "TRAJ", "TRDD", "TRDJ", "TRDV", "TRGV", "TRGJ",
];
const IG_SEGMENTS: &[&str] = &["IGHV", "IGHD", "IGHJ", "IGKV", "IGKJ", "IGLV", "IGLJ"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Species(String);

impl Species {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case, underscore-separated form used for directory and file names.
    pub fn slug(&self) -> String {
        self.0.replace(' ', "_").to_lowercase()
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Species {
    type Err = ScrapeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = capitalize(&value.split_whitespace().collect::<Vec<_>>().join(" "));
        if !KNOWN_SPECIES.contains(&normalized.as_str()) {
            return Err(ScrapeError::InvalidSpecies {
                value: value.to_string(),
                valid: KNOWN_SPECIES.join(", "),
            });
        }
        Ok(Self(normalized))
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SequenceType {
    #[serde(rename = "IG")]
    Ig,
    #[serde(rename = "TCR")]
    Tcr,
}

impl SequenceType {
    pub fn segments(&self) -> &'static [&'static str] {
        match self {
            SequenceType::Ig => IG_SEGMENTS,
            SequenceType::Tcr => TCR_SEGMENTS,
        }
    }

    /// Locus prefix shared by every segment name of this receptor type.
    pub fn locus_prefix(&self) -> &'static str {
        match self {
            SequenceType::Ig => "IG",
            SequenceType::Tcr => "TR",
        }
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceType::Ig => write!(f, "IG"),
            SequenceType::Tcr => write!(f, "TCR"),
        }
    }
}

impl FromStr for SequenceType {
    type Err = ScrapeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "IG" => Ok(SequenceType::Ig),
            "TCR" => Ok(SequenceType::Tcr),
            _ => Err(ScrapeError::InvalidSequenceType {
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameSelection {
    /// F+ORF+all P
    #[default]
    All,
    /// F+ORF+in-frame P
    InFrame,
    /// F+ORF+in-frame P with IMGT gaps
    InFrameGaps,
}

impl FrameSelection {
    /// GENElect query code for this selection.
    pub fn query_code(&self) -> &'static str {
        match self {
            FrameSelection::All => "7.2",
            FrameSelection::InFrame => "7.5",
            FrameSelection::InFrameGaps => "7.1",
        }
    }
}

impl fmt::Display for FrameSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameSelection::All => write!(f, "all"),
            FrameSelection::InFrame => write!(f, "in-frame"),
            FrameSelection::InFrameGaps => write!(f, "in-frame-gaps"),
        }
    }
}

impl FromStr for FrameSelection {
    type Err = ScrapeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "all" => Ok(FrameSelection::All),
            "in-frame" => Ok(FrameSelection::InFrame),
            "in-frame-gaps" => Ok(FrameSelection::InFrameGaps),
            _ => Err(ScrapeError::InvalidFrameSelection {
                value: value.to_string(),
            }),
        }
    }
}

/// Unvalidated request as typed on the command line.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    pub species: String,
    pub sequence_type: String,
    pub output: Option<String>,
    pub frame_selection: Option<String>,
    pub create_library: bool,
    pub cleanup: bool,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeRequest {
    species: Species,
    sequence_type: SequenceType,
    output_dir: Utf8PathBuf,
    frame_selection: FrameSelection,
    create_library: bool,
    cleanup: bool,
    force: bool,
}

impl ScrapeRequest {
    /// Validates every field; relative output paths are resolved against `cwd`
    /// and `..` components are folded away.
    pub fn from_raw(raw: &RawRequest, cwd: &Utf8Path) -> Result<Self, ScrapeError> {
        let species: Species = raw.species.parse()?;
        let sequence_type: SequenceType = raw.sequence_type.parse()?;
        let frame_selection = raw
            .frame_selection
            .as_deref()
            .map(str::parse::<FrameSelection>)
            .transpose()?
            .unwrap_or_default();
        let output_dir = match raw.output.as_deref().map(str::trim) {
            Some(output) if !output.is_empty() => normalize_lexically(&cwd.join(output)),
            _ => normalize_lexically(&cwd.join(species.slug())),
        };

        Ok(Self {
            species,
            sequence_type,
            output_dir,
            frame_selection,
            create_library: raw.create_library,
            cleanup: raw.cleanup,
            force: raw.force,
        })
    }

    pub fn species(&self) -> &Species {
        &self.species
    }

    pub fn sequence_type(&self) -> SequenceType {
        self.sequence_type
    }

    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    pub fn frame_selection(&self) -> FrameSelection {
        self.frame_selection
    }

    pub fn create_library(&self) -> bool {
        self.create_library
    }

    pub fn cleanup(&self) -> bool {
        self.cleanup
    }

    pub fn force(&self) -> bool {
        self.force
    }

    /// Deterministic library file name, e.g. `homo_sapiens_tcr.fasta`. Frame
    /// selections other than `all` are appended: `mus_ig_in-frame-gaps.fasta`.
    pub fn library_file_name(&self) -> String {
        let stem = format!(
            "{}_{}",
            self.species.slug(),
            self.sequence_type.to_string().to_lowercase()
        );
        match self.frame_selection {
            FrameSelection::All => format!("{stem}.fasta"),
            frame => format!("{stem}_{frame}.fasta"),
        }
    }

    pub fn segment_path(&self, segment: &str) -> Utf8PathBuf {
        self.output_dir.join(format!("{segment}.fasta"))
    }
}
