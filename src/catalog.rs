// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Reference catalogs: species, life stages, pupae defects and larval diseases
//!
//! Each catalog is ordered. The order is the class order of the model that
//! predicts it, so `class_names()[i]` is the label for output index `i`.

use serde::Serialize;
use tracing::{info, warn};

use crate::classify::ClassifierKind;
use crate::config::AppConfig;
use crate::store::{self, Table};

/// Species image counts used to train the species model
pub const SPECIES_IMAGE_COUNTS_FILE: &str = "butterfly_data.csv";

/// Per-species detection performance
pub const DETECTION_PERFORMANCE_FILE: &str = "Butterfly Species.csv";

/// Static description of one butterfly or moth species
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SpeciesInfo {
    pub name: &'static str,
    pub scientific_name: &'static str,
    pub family: &'static str,
    pub discovered: &'static str,
    pub year: &'static str,
    pub description: &'static str,
    pub host_plants: &'static [&'static str],
}

pub const SPECIES: &[SpeciesInfo] = &[
    SpeciesInfo {
        name: "Butterfly-Clippers",
        scientific_name: "Parthenos sylvia",
        family: "Nymphalidae",
        discovered: "Carl Peter Thunberg, Cramer",
        year: "1776",
        description: "Forewing triangular; costa very slightly curved, apex rounded, exterior margin oblique and slightly scalloped, posterior margin short, angle convex.",
        host_plants: &["Wild Cucumber"],
    },
    SpeciesInfo {
        name: "Butterfly-Common Jay",
        scientific_name: "Graphium doson",
        family: "Papilionidae",
        discovered: "C. & R. Felder",
        year: "1864",
        description: "",
        host_plants: &["Avocado Tree", "Soursop", "Sugar Apple", "Amuyon", "Indian Tree"],
    },
    SpeciesInfo {
        name: "Butterfly-Common Lime",
        scientific_name: "Papilio demoleus",
        family: "Papilionidae",
        discovered: "Linnaeus",
        year: "1758",
        description: "The butterfly is tailless and has a wingspan of 80-100 mm, with a large number of irregular spots on the wing.",
        host_plants: &["Limeberry", "Calamondin", "Pomelo", "Sweet Orange", "Calamansi"],
    },
    SpeciesInfo {
        name: "Butterfly-Common Mime",
        scientific_name: "Papilio clytia",
        family: "Papilionidae",
        discovered: "Linnaeus",
        year: "1758",
        description: "A black-bodied swallowtail and an example of Batesian mimicry: it mimics the appearance of distasteful butterflies.",
        host_plants: &["Clover Cinnamon", "Wild Cinnamon"],
    },
    SpeciesInfo {
        name: "Butterfly-Common Mormon",
        scientific_name: "Papilio polytes",
        family: "Papilionidae",
        discovered: "Linnaeus",
        year: "1758",
        description: "",
        host_plants: &[
            "Limeberry",
            "Calamondin",
            "Pomelo",
            "Sweet Orange",
            "Calamansi",
            "Lemoncito",
        ],
    },
    SpeciesInfo {
        name: "Butterfly-Emerald Swallowtail",
        scientific_name: "Papilio palinurus",
        family: "Papilionidae",
        discovered: "Fabricius",
        year: "1787",
        description: "",
        host_plants: &["Curry Leafs", "Pink Lime-Berry Tree"],
    },
    SpeciesInfo {
        name: "Butterfly-Golden Birdwing",
        scientific_name: "Troides rhadamantus",
        family: "Papilionidae",
        discovered: "H. Lucas",
        year: "1835",
        description: "",
        host_plants: &["Dutchman Pipe", "Indian Birthwort"],
    },
    SpeciesInfo {
        name: "Butterfly-Gray Glassy Tiger",
        scientific_name: "Ideopsis juventa",
        family: "Nymphalidae",
        discovered: "Cramer",
        year: "1777",
        description: "",
        host_plants: &["Limeberry", "Calamondin", "Pomelo", "Sweet Orange", "Calamansi"],
    },
    SpeciesInfo {
        name: "Butterfly-Great Eggfly",
        scientific_name: "Hypolimnas bolina",
        family: "Nymphalidae",
        discovered: "Linnaeus",
        year: "1758",
        description: "",
        host_plants: &["Dutchman Pipe", "Indian Birthwort"],
    },
    SpeciesInfo {
        name: "Butterfly-Great Yellow Mormon",
        scientific_name: "Papilio lowi",
        family: "Papilionidae",
        discovered: "",
        year: "",
        description: "",
        host_plants: &["Sweet Potato", "Water Spinach"],
    },
    SpeciesInfo {
        name: "Butterfly-Paper Kite",
        scientific_name: "Idea leuconoe",
        family: "Nymphalidae",
        discovered: "Rothschild",
        year: "1895",
        description: "",
        host_plants: &["Common Skillpod"],
    },
    SpeciesInfo {
        name: "Butterfly-Pink Rose",
        scientific_name: "Pachliopta kotzebuea",
        family: "Papilionidae",
        discovered: "Escholtz",
        year: "1821",
        description: "",
        host_plants: &["Dutchman Pipe", "Indian Birthwort"],
    },
    SpeciesInfo {
        name: "Butterfly-Plain Tiger",
        scientific_name: "Danaus chrysippus",
        family: "Nymphalidae",
        discovered: "Hulstaert",
        year: "1931",
        description: "",
        host_plants: &["Crown flower", "Giant Milkweed"],
    },
    SpeciesInfo {
        name: "Butterfly-Red Lacewing",
        scientific_name: "Cethosia biblis",
        family: "Nymphalidae",
        discovered: "Drury",
        year: "1773",
        description: "",
        host_plants: &["Wild Bush Passion Fruits"],
    },
    SpeciesInfo {
        name: "Butterfly-Scarlet Mormon",
        scientific_name: "Papilio rumanzovia",
        family: "Papilionidae",
        discovered: "Eschscholtz",
        year: "1821",
        description: "",
        host_plants: &["Calamondin", "Pomelo", "Sweet Orange", "Calamansi"],
    },
    SpeciesInfo {
        name: "Butterfly-Tailed Jay",
        scientific_name: "Graphium agamemnon",
        family: "Papilionidae",
        discovered: "Linnaeus",
        year: "1758",
        description: "",
        host_plants: &["Avocado Tree", "Soursop", "Sugar Apple", "Amuyon", "Indian Tree"],
    },
    SpeciesInfo {
        name: "Moth-Atlas",
        scientific_name: "Attacus atlas",
        family: "Saturniidae",
        discovered: "Linnaeus",
        year: "1758",
        description: "",
        host_plants: &["Amuyon", "Gmelina Tree", "Soursop"],
    },
    SpeciesInfo {
        name: "Moth-Giant Silk",
        scientific_name: "Samia cynthia",
        family: "Saturniidae",
        discovered: "Hubner",
        year: "1819",
        description: "",
        host_plants: &["Curry Leafs"],
    },
];

const LIFE_STAGES: &[(&str, &str)] = &[
    ("Butterfly", "Reproductive stage, winged insect capable of flight."),
    ("Eggs", "Early developmental stage, typically laid on host plants."),
    ("Larvae", "Caterpillar stage, primary feeding and growth phase."),
    ("Pupae", "Chrysalis (butterfly) or cocoon (moth) stage, metamorphosis occurs."),
];

const PUPAE_DEFECTS: &[(&str, &str)] = &[
    ("Ant bites", "Indicates ant damage, can lead to pupae death or malformation."),
    ("Deformed body", "Physical deformities, may indicate poor health or environmental stress."),
    ("Healthy Pupae", "No visible defects, good potential for adult emergence."),
    ("Old Pupa", "Pupae nearing emergence or past its prime, may be discolored or shriveled."),
    ("Overbend", "Abnormal curvature, can impede proper development."),
    (
        "Stretch abdomen",
        "Abdomen appears stretched or elongated, potentially due to stress or disease.",
    ),
];

const LARVAL_DISEASES: &[(&str, &str)] = &[
    (
        "Anaphylaxis Infection",
        "Seek entomologist advice; isolate infected larvae. No specific treatment for severe cases.",
    ),
    (
        "Gnathostomiasis",
        "Parasitic infection. Isolate, remove parasites if visible, improve hygiene.",
    ),
    ("Healthy", "Larva appears healthy with no signs of disease."),
    (
        "Nucleopolyhedrosis",
        "Highly contagious viral disease. Isolate and destroy infected larvae to prevent spread. \
         Disinfect rearing areas.",
    ),
];

/// Activity types offered by the task form
pub const ACTIVITY_TYPES: &[&str] = &[
    "Harvesting Eggs",
    "Harvesting Pupae",
    "Harvesting Pupae and Eggs",
    "Feeding Larvae",
    "Butterfly Foraging",
    "Cleaning Enclosures",
    "Pest Control",
    "Health Check",
];

/// One labelled entry with its descriptive attributes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub label: String,
    pub attributes: Vec<(String, String)>,
}

/// Read-only lookup from label to attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReferenceCatalog {
    entries: Vec<CatalogEntry>,
}

impl ReferenceCatalog {
    fn from_pairs(attribute: &str, pairs: &[(&str, &str)]) -> Self {
        let entries = pairs
            .iter()
            .map(|(label, value)| CatalogEntry {
                label: label.to_string(),
                attributes: vec![(attribute.to_string(), value.to_string())],
            })
            .collect();
        Self { entries }
    }

    /// Species, with the attributes recorded on classification
    pub fn species() -> Self {
        let entries = SPECIES
            .iter()
            .map(|s| CatalogEntry {
                label: s.name.to_string(),
                attributes: vec![
                    ("scientific_name".to_string(), s.scientific_name.to_string()),
                    ("family".to_string(), s.family.to_string()),
                    ("discovered".to_string(), s.discovered.to_string()),
                    ("year".to_string(), s.year.to_string()),
                ],
            })
            .collect();
        Self { entries }
    }

    pub fn life_stages() -> Self {
        Self::from_pairs("stages_info", LIFE_STAGES)
    }

    pub fn pupae_defects() -> Self {
        Self::from_pairs("quality_info", PUPAE_DEFECTS)
    }

    pub fn larval_diseases() -> Self {
        Self::from_pairs("treatment_info", LARVAL_DISEASES)
    }

    /// The built-in catalog for a classifier
    pub fn for_classifier(kind: ClassifierKind) -> Self {
        match kind {
            ClassifierKind::Species => Self::species(),
            ClassifierKind::LifeStages => Self::life_stages(),
            ClassifierKind::PupaeDefects => Self::pupae_defects(),
            ClassifierKind::LarvalDiseases => Self::larval_diseases(),
        }
    }

    /// The catalog a classifier runs with: the configured catalog CSV when
    /// one is set and readable, otherwise the built-in table
    pub fn configured(config: &AppConfig, kind: ClassifierKind) -> Self {
        let Some(path) = config.catalog_path(kind) else {
            return Self::for_classifier(kind);
        };

        let key = &config.classifiers.get(kind).catalog_key;
        let catalog = Self::from_table(&store::load_table(&path), key);
        if catalog.is_empty() {
            warn!("No {} catalog entries in {:?}; using the built-in labels", kind, path);
            return Self::for_classifier(kind);
        }
        info!("Loaded {} {} catalog entries from {:?}", catalog.len(), kind, path);
        catalog
    }

    /// Build a catalog from a CSV table keyed by `key_column`.
    ///
    /// Rows without a key are skipped; the first row wins for duplicate keys.
    pub fn from_table(table: &Table, key_column: &str) -> Self {
        let Some(key_idx) = table.column(key_column) else {
            return Self::default();
        };

        let mut catalog = Self::default();
        for row in &table.rows {
            let Some(label) = row.get(key_idx).filter(|l| !l.trim().is_empty()) else {
                continue;
            };
            if catalog.get(label).is_some() {
                continue;
            }
            let attributes = table
                .headers
                .iter()
                .zip(row.iter())
                .enumerate()
                .filter(|(i, _)| *i != key_idx)
                .map(|(_, (h, v))| (h.clone(), v.clone()))
                .collect();
            catalog.entries.push(CatalogEntry {
                label: label.clone(),
                attributes,
            });
        }
        catalog
    }

    pub fn get(&self, label: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.label == label)
    }

    /// Labels in model output order
    pub fn class_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.label.clone()).collect()
    }

    /// Attribute names of the catalog (taken from its first entry)
    pub fn attribute_names(&self) -> Vec<String> {
        self.entries
            .first()
            .map(|e| e.attributes.iter().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Species names in species-model output order
pub fn species_names() -> Vec<&'static str> {
    SPECIES.iter().map(|s| s.name).collect()
}

pub fn species_info(name: &str) -> Option<&'static SpeciesInfo> {
    SPECIES.iter().find(|s| s.name == name)
}

/// Host plants for a species, formatted for display
pub fn host_plants(species: &str) -> Option<String> {
    species_info(species).map(|s| s.host_plants.join(", "))
}

/// Image counts per species from the training data summary
pub fn species_image_counts(table: &Table) -> Vec<(String, u64)> {
    let (Some(species_idx), Some(count_idx)) =
        (table.column("Species"), table.column("Number of Images"))
    else {
        return Vec::new();
    };
    table
        .rows
        .iter()
        .filter_map(|row| {
            let species = row.get(species_idx)?;
            let count = row.get(count_idx)?.trim().parse::<u64>().ok()?;
            Some((species.clone(), count))
        })
        .collect()
}

/// Correct and incorrect detections per species from the detection
/// performance table; rows with unreadable counts are skipped
pub fn detection_counts(table: &Table) -> Vec<(String, u64, u64)> {
    let (Some(species_idx), Some(correct_idx), Some(incorrect_idx)) = (
        table.column("Butterfly Species"),
        table.column("Correct Detected"),
        table.column("Incorrect Detected"),
    ) else {
        return Vec::new();
    };
    let count = |row: &[String], idx: usize| row.get(idx)?.trim().parse::<u64>().ok();
    table
        .rows
        .iter()
        .filter_map(|row| {
            let species = row.get(species_idx)?.clone();
            let correct = count(row.as_slice(), correct_idx)?;
            let incorrect = count(row.as_slice(), incorrect_idx)?;
            Some((species, correct, incorrect))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn attribute<'a>(entry: &'a CatalogEntry, name: &str) -> Option<&'a str> {
        entry.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_catalog_sizes_match_models() {
        assert_eq!(ReferenceCatalog::species().len(), 18);
        assert_eq!(
            ReferenceCatalog::life_stages().class_names(),
            vec!["Butterfly", "Eggs", "Larvae", "Pupae"]
        );
        assert_eq!(ReferenceCatalog::pupae_defects().len(), 6);
        assert_eq!(ReferenceCatalog::larval_diseases().len(), 4);
    }

    #[test]
    fn test_species_names_are_unique_and_canonical() {
        let names = species_names();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), names.len());
        assert!(names.iter().all(|n| n.starts_with("Butterfly-") || n.starts_with("Moth-")));
    }

    #[test]
    fn test_species_attributes() {
        let catalog = ReferenceCatalog::species();
        let entry = catalog.get("Moth-Atlas").unwrap();
        assert_eq!(attribute(entry, "scientific_name"), Some("Attacus atlas"));
        assert_eq!(attribute(entry, "family"), Some("Saturniidae"));
        assert_eq!(
            catalog.attribute_names(),
            vec!["scientific_name", "family", "discovered", "year"]
        );
    }

    #[test]
    fn test_host_plants() {
        let plants = host_plants("Butterfly-Plain Tiger");
        assert_eq!(plants.as_deref(), Some("Crown flower, Giant Milkweed"));
        assert_eq!(host_plants("BUtterfly-Golden Birdwing"), None);
    }

    #[test]
    fn test_from_table_skips_blank_and_duplicate_keys() {
        let table = Table {
            headers: vec!["Species".into(), "Family".into()],
            rows: vec![
                vec!["Moth-Atlas".into(), "Saturniidae".into()],
                vec!["".into(), "Nymphalidae".into()],
                vec!["Moth-Atlas".into(), "Other".into()],
            ],
        };
        let catalog = ReferenceCatalog::from_table(&table, "Species");
        assert_eq!(catalog.len(), 1);
        assert_eq!(attribute(catalog.get("Moth-Atlas").unwrap(), "Family"), Some("Saturniidae"));
        assert!(ReferenceCatalog::from_table(&table, "Nope").is_empty());
    }

    #[test]
    fn test_configured_catalog_overrides_built_in() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.paths.data_dir = dir.path().to_path_buf();
        let stages =
            |config: &AppConfig| ReferenceCatalog::configured(config, ClassifierKind::LifeStages);
        assert_eq!(stages(&config), ReferenceCatalog::life_stages());

        config.classifiers.life_stages.catalog_file = Some("stages.csv".to_string());
        assert_eq!(stages(&config), ReferenceCatalog::life_stages());

        let csv = "class_name,stages_info\nEgg,Laid\nAdult,Flying\n";
        std::fs::write(dir.path().join("stages.csv"), csv).unwrap();
        let catalog = stages(&config);
        assert_eq!(catalog.class_names(), vec!["Egg", "Adult"]);
        assert_eq!(attribute(catalog.get("Adult").unwrap(), "stages_info"), Some("Flying"));
    }

    #[test]
    fn test_species_image_counts_skips_bad_rows() {
        let table = Table {
            headers: vec!["Species".into(), "Number of Images".into()],
            rows: vec![
                vec!["Moth-Atlas".into(), "4".into()],
                vec!["Moth-Giant Silk".into(), "many".into()],
            ],
        };
        assert_eq!(species_image_counts(&table), vec![("Moth-Atlas".to_string(), 4)]);
    }

    #[test]
    fn test_detection_counts() {
        let table = Table {
            headers: vec![
                "Butterfly Species".into(),
                "Correct Detected".into(),
                "Incorrect Detected".into(),
            ],
            rows: vec![
                vec!["Butterfly-Clippers".into(), "45".into(), "5".into()],
                vec!["Moth-Atlas".into(), "".into(), "2".into()],
            ],
        };
        assert_eq!(detection_counts(&table), vec![("Butterfly-Clippers".to_string(), 45, 5)]);
        assert!(detection_counts(&Table::default()).is_empty());
    }
}
