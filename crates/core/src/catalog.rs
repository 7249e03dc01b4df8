// Calibrator Catalog - built-in configuration records
//
// Line/token coordinates below are the report formats of the LCPandoraAnalysis
// binaries. A format change in a binary silently breaks its entry here.

use crate::config::ToolchainConfig;
use crate::domain::{
    Calibrator, CalibratorSpec, DomainError, ExecutableLocation, FieldLocator, OutputPassing,
    OutputSpec, ParameterSpec, ResultSchema, SeriesSpec,
};
use crate::error::Result;
use std::collections::BTreeMap;

/// Steering-file override naming the ROOT file written by the PFO analysis processor
pub const MARLIN_ROOT_FILE_OVERRIDE: &str = "--MyPfoAnalysis.RootFile=";

/// Number of software compensation weights in the soft-comp report
pub const SOFT_COMP_WEIGHT_COUNT: usize = 9;

/// Named set of calibrator records
#[derive(Debug, Clone, Default)]
pub struct CalibratorCatalog {
    specs: BTreeMap<String, CalibratorSpec>,
}

impl CalibratorCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding every built-in calibrator
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for spec in builtin_specs() {
            catalog.specs.insert(spec.name.clone(), spec);
        }
        catalog
    }

    /// Add or replace a record after validating it
    pub fn register(&mut self, spec: CalibratorSpec) -> Result<()> {
        spec.validate()?;
        self.specs.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CalibratorSpec> {
        self.specs.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn specs(&self) -> impl Iterator<Item = &CalibratorSpec> {
        self.specs.values()
    }

    /// Instantiate a calibrator with its executable resolved
    ///
    /// # Errors
    /// - DomainError::UnknownCalibrator for an unknown name
    /// - AppError::Config if the executable location cannot be resolved
    pub fn calibrator(&self, name: &str, toolchain: &ToolchainConfig) -> Result<Calibrator> {
        let spec = self
            .get(name)
            .ok_or_else(|| DomainError::UnknownCalibrator(name.to_string()))?;
        let executable = toolchain.resolve(&spec.executable)?;
        Ok(Calibrator::new(spec.clone(), executable))
    }
}

fn schema(fields: &[(usize, usize, &str)]) -> ResultSchema {
    let locators = fields
        .iter()
        .map(|(line, token, name)| FieldLocator::new(*line, *token, *name))
        .collect();
    // built-in tables are static and unique by construction
    ResultSchema::new(locators).unwrap_or_default()
}

fn analysis_binary(
    name: &str,
    binary: &str,
    description: &str,
    parameters: Vec<ParameterSpec>,
    output_flag: &str,
    default_prefix: &str,
    fields: &[(usize, usize, &str)],
) -> CalibratorSpec {
    CalibratorSpec {
        name: name.to_string(),
        description: description.to_string(),
        executable: ExecutableLocation::InstallRoot {
            binary: binary.to_string(),
        },
        parameters,
        output: OutputSpec {
            flag: Some(output_flag.to_string()),
            passing: OutputPassing::Prefix,
            default_prefix: default_prefix.to_string(),
            suffix: crate::domain::calibrator::DEFAULT_ARTIFACT_SUFFIX.to_string(),
            keep: false,
        },
        schema: schema(fields),
        series: Vec::new(),
    }
}

fn root_file() -> ParameterSpec {
    ParameterSpec::value("root-file", "-a", "Input ROOT file from the PFO analysis").required()
}

fn energy(name: &str, default: u32, particle: &str) -> ParameterSpec {
    ParameterSpec::value(name, "-b", &format!("{} energy in GeV", particle)).with_default(default)
}

fn detector_region() -> ParameterSpec {
    ParameterSpec::value("detector-region", "-g", "Detector region (Barrel, EndCap or All)")
}

fn cos_theta_range() -> [ParameterSpec; 2] {
    [
        ParameterSpec::value("cos-theta-min", "-i", "Lower bound of |cos(theta)| acceptance")
            .with_default(0),
        ParameterSpec::value("cos-theta-max", "-j", "Upper bound of |cos(theta)| acceptance")
            .with_default(1),
    ]
}

fn builtin_specs() -> Vec<CalibratorSpec> {
    let [cos_min, cos_max] = cos_theta_range();
    let [hcal_cos_min, hcal_cos_max] = cos_theta_range();

    let weight_names: Vec<String> = (0..SOFT_COMP_WEIGHT_COUNT)
        .map(|w| format!("weight{}", w))
        .collect();
    let weight_fields: Vec<(usize, usize, &str)> = weight_names
        .iter()
        .enumerate()
        .map(|(w, name)| (8 + w, 3, name.as_str()))
        .collect();

    let mut soft_comp = analysis_binary(
        "pandora-soft-comp",
        "PandoraPFACalibrate_SoftwareCompensation",
        "Software compensation weights",
        vec![
            ParameterSpec::list("energies", "-e", "Kaon0L energies in GeV").required(),
            ParameterSpec::value("root-file-pattern", "-f", "ROOT file pattern, %energy% is substituted")
                .required(),
            ParameterSpec::value("root-tree", "-t", "Name of the ROOT tree"),
            ParameterSpec::switch("cluster-energy", "-g", "Use cluster energy instead of PFO energy"),
        ],
        "-d",
        "./PandoraSoftComp_",
        &weight_fields,
    );
    soft_comp.series.push(SeriesSpec {
        name: "softCompWeights".to_string(),
        fields: weight_names.clone(),
    });

    vec![
        CalibratorSpec {
            name: "marlin".to_string(),
            description: "Marlin reconstruction driver; artifact is the PFO analysis ROOT file"
                .to_string(),
            executable: ExecutableLocation::SearchPath {
                binary: "Marlin".to_string(),
            },
            parameters: vec![
                ParameterSpec::positional("steering-file", "Marlin XML steering file").required(),
            ],
            // Marlin command-line override of the PFO analysis processor's ROOT file
            output: OutputSpec {
                flag: Some(MARLIN_ROOT_FILE_OVERRIDE.to_string()),
                passing: OutputPassing::InlinePath,
                default_prefix: "./MarlinPfoAnalysis".to_string(),
                suffix: ".root".to_string(),
                keep: true,
            },
            schema: ResultSchema::empty(),
            series: Vec::new(),
        },
        analysis_binary(
            "mip",
            "SimCaloHitEnergyDistribution",
            "MIP peak positions from simulated calorimeter hits",
            vec![root_file(), energy("muon-energy", 10, "Muon")],
            "-c",
            "./SimCaloHitEnergyDistribution_",
            &[
                (7, 5, "hcalBarrelMip"),
                (8, 5, "hcalEndcapMip"),
                (9, 5, "hcalRingMip"),
                (10, 4, "ecalMip"),
            ],
        ),
        analysis_binary(
            "ecal",
            "ECalDigitisation_ContainedEvents",
            "ECal digitisation constant from contained photons",
            vec![
                root_file(),
                energy("photon-energy", 10, "Photon"),
                detector_region(),
                cos_min,
                cos_max,
            ],
            "-d",
            "./EcalEnergyCalibration_",
            &[(11, 4, "ecalDigiMean")],
        ),
        analysis_binary(
            "ecal-ring",
            "ECalDigitisation_DirectionCorrectionDistribution",
            "ECal endcap and ring direction corrections",
            vec![root_file(), energy("photon-energy", 10, "Photon")],
            "-c",
            "./EcalRingEnergyCalibration_",
            &[
                (4, 5, "endcapMeanDirectionCorrection"),
                (9, 5, "ringMeanDirectionCorrection"),
            ],
        ),
        analysis_binary(
            "hcal",
            "HCalDigitisation_ContainedEvents",
            "HCal digitisation constant from contained neutral kaons",
            vec![
                root_file(),
                energy("kaon0l-energy", 20, "Kaon0L"),
                detector_region(),
                hcal_cos_min,
                hcal_cos_max,
            ],
            "-d",
            "./HcalEnergyCalibration_",
            &[(9, 5, "hcalDigiMean")],
        ),
        analysis_binary(
            "hcal-ring",
            "HCalDigitisation_DirectionCorrectionDistribution",
            "HCal endcap and ring direction corrections",
            vec![root_file(), energy("kaon0l-energy", 20, "Kaon0L")],
            "-c",
            "./HcalRingEnergyCalibration_",
            &[
                (4, 5, "endcapMeanDirectionCorrection"),
                (9, 5, "ringMeanDirectionCorrection"),
            ],
        ),
        analysis_binary(
            "pandora-mip-scale",
            "PandoraPFACalibrate_MipResponse",
            "Pandora GeV-to-MIP scales",
            vec![root_file(), energy("muon-energy", 10, "Muon")],
            "-c",
            "./PandoraMipScale_",
            &[
                (8, 2, "ecalToGeVMip"),
                (16, 2, "hcalToGeVMip"),
                (24, 2, "muonToGeVMip"),
            ],
        ),
        analysis_binary(
            "pandora-em-scale",
            "PandoraPFACalibrate_EMScale",
            "Pandora electromagnetic energy scale",
            vec![root_file(), energy("photon-energy", 10, "Photon")],
            "-d",
            "./PandoraEMScale_",
            &[(9, 3, "ecalToEMMean")],
        ),
        analysis_binary(
            "pandora-had-scale",
            "PandoraPFACalibrate_HadronicScale_ChiSquareMethod",
            "Pandora hadronic energy scale (chi-square method)",
            vec![root_file(), energy("kaon0l-energy", 10, "Kaon0L")],
            "-d",
            "./PandoraHadScale_",
            &[(5, 2, "ecalToHad"), (6, 2, "hcalToHad")],
        ),
        soft_comp,
    ]
}
