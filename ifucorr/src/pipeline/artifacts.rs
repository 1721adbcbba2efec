//! Output file naming.

use std::path::{Path, PathBuf};

/// Processing stage of one exposure, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Unit,
    Subunit,
    SkySub,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Unit, Stage::Subunit, Stage::SkySub];

    pub fn id(self) -> &'static str {
        match self {
            Stage::Unit => "unit",
            Stage::Subunit => "subunit",
            Stage::SkySub => "skysub",
        }
    }

    /// Artifacts written by this stage. The cube comes last.
    pub fn artifacts(self) -> &'static [Artifact] {
        match self {
            Stage::Unit => &[
                Artifact::UnitTable,
                Artifact::UnitCurves,
                Artifact::UnitImage,
                Artifact::UnitCube,
            ],
            Stage::Subunit => &[
                Artifact::SubunitTable,
                Artifact::NativeMask,
                Artifact::EdgeMask,
                Artifact::SubunitImage,
                Artifact::SubunitCube,
            ],
            Stage::SkySub => &[Artifact::SkySubImage, Artifact::SkySubCube],
        }
    }

    /// The cube handed to the next stage.
    pub fn cube(self) -> Artifact {
        match self {
            Stage::Unit => Artifact::UnitCube,
            Stage::Subunit => Artifact::SubunitCube,
            Stage::SkySub => Artifact::SkySubCube,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// A persisted per-exposure product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    UnitTable,
    UnitCurves,
    UnitCube,
    UnitImage,
    SubunitTable,
    NativeMask,
    EdgeMask,
    SubunitCube,
    SubunitImage,
    SkySubCube,
    SkySubImage,
}

impl Artifact {
    pub fn file_name(self, exposure: &str) -> String {
        match self {
            Artifact::UnitTable => format!("ILLCORR_{exposure}_unit.fits"),
            Artifact::UnitCurves => format!("ILLCORRNORM_{exposure}_unit.fits"),
            Artifact::UnitCube => format!("DATACUBE_{exposure}_ILLCORR_unit.fits"),
            Artifact::UnitImage => format!("IMAGE_{exposure}_ILLCORR_unit.fits"),
            Artifact::SubunitTable => format!("ILLCORR_{exposure}_subunit.fits"),
            Artifact::NativeMask => format!("MASK_{exposure}_native.fits"),
            Artifact::EdgeMask => format!("MASK_{exposure}_edges.fits"),
            Artifact::SubunitCube => format!("DATACUBE_{exposure}_ILLCORR_subunit.fits"),
            Artifact::SubunitImage => format!("IMAGE_{exposure}_ILLCORR_subunit.fits"),
            Artifact::SkySubCube => format!("DATACUBE_{exposure}_SKYSUB.fits"),
            Artifact::SkySubImage => format!("IMAGE_{exposure}_SKYSUB.fits"),
        }
    }
}

/// Output locations of one exposure.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    dir: PathBuf,
    exposure: String,
}

impl ArtifactPaths {
    pub fn new(dir: impl Into<PathBuf>, exposure: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            exposure: exposure.into(),
        }
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[inline]
    pub fn exposure(&self) -> &str {
        &self.exposure
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name(&self.exposure))
    }
}
