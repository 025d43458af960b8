//! Classification key codec
//!
//! Every exported image carries an 11-character positional key:
//!
//! ```text
//! 01 02 05 0 1 1 0 6
//! |  |  |  | | | | '- age bracket (1)
//! |  |  |  | | | '--- sex (1)
//! |  |  |  | | '----- acquisition channel (1)
//! |  |  |  | '------- origin (1)
//! |  |  |  '--------- validity (1)
//! |  |  '------------ projection (2)
//! |  '--------------- body region (2)
//! '------------------ study type (2)
//! ```
//!
//! Each field is drawn from a closed table of codes. The first four characters
//! (study type + region) are the group prefix that places an image in the
//! archive and in its metadata document.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Total length of a classification key
pub const KEY_LEN: usize = 11;

/// Length of the group prefix (study type + region)
pub const GROUP_PREFIX_LEN: usize = 4;

/// One positional field of a classification key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    /// Imaging modality
    StudyType,
    /// Body region
    Region,
    /// Projection
    Projection,
    /// Whether the image is usable
    Validity,
    /// Natural or synthetic
    Origin,
    /// How the image reached the repository
    Acquisition,
    /// Patient sex
    Sex,
    /// Patient age bracket
    AgeBracket,
}

impl Field {
    /// All fields in key order
    pub const ALL: [Field; 8] = [
        Field::StudyType,
        Field::Region,
        Field::Projection,
        Field::Validity,
        Field::Origin,
        Field::Acquisition,
        Field::Sex,
        Field::AgeBracket,
    ];

    /// Machine name used in errors and logs
    pub fn name(&self) -> &'static str {
        match self {
            Field::StudyType => "study_type",
            Field::Region => "region",
            Field::Projection => "projection",
            Field::Validity => "validity",
            Field::Origin => "origin",
            Field::Acquisition => "acquisition",
            Field::Sex => "sex",
            Field::AgeBracket => "age_bracket",
        }
    }

    /// Heading used in the naming-convention document
    pub fn title(&self) -> &'static str {
        match self {
            Field::StudyType => "Tipo de estudio",
            Field::Region => "Region",
            Field::Projection => "Proyeccion",
            Field::Validity => "Valida",
            Field::Origin => "Origen",
            Field::Acquisition => "Obtencion",
            Field::Sex => "Sexo",
            Field::AgeBracket => "Edad (rango de edades)",
        }
    }

    /// Number of characters the field occupies
    pub fn width(&self) -> usize {
        match self {
            Field::StudyType | Field::Region | Field::Projection => 2,
            _ => 1,
        }
    }

    /// Zero-based character offset of the field within the key
    pub fn offset(&self) -> usize {
        match self {
            Field::StudyType => 0,
            Field::Region => 2,
            Field::Projection => 4,
            Field::Validity => 6,
            Field::Origin => 7,
            Field::Acquisition => 8,
            Field::Sex => 9,
            Field::AgeBracket => 10,
        }
    }

    /// The closed table of `(code, label)` pairs for this field
    pub fn codes(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Field::StudyType => STUDY_TYPES,
            Field::Region => REGIONS,
            Field::Projection => PROJECTIONS,
            Field::Validity => VALIDITY,
            Field::Origin => ORIGINS,
            Field::Acquisition => ACQUISITION_CHANNELS,
            Field::Sex => SEXES,
            Field::AgeBracket => AGE_BRACKETS,
        }
    }

    /// Label for a code, if the code is in the table
    pub fn label(&self, code: &str) -> Option<&'static str> {
        self.codes()
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, label)| *label)
    }

    /// Check a value against the field's width and table
    pub fn validate(&self, value: &str) -> Result<()> {
        if value.len() != self.width() {
            return Err(Error::InvalidField {
                field: self.name().to_string(),
                value: value.to_string(),
                reason: format!("expected {} character(s)", self.width()),
            });
        }
        if self.label(value).is_none() {
            let allowed: Vec<&str> = self.codes().iter().map(|(c, _)| *c).collect();
            return Err(Error::InvalidField {
                field: self.name().to_string(),
                value: value.to_string(),
                reason: format!("expected one of {}", allowed.join(", ")),
            });
        }
        Ok(())
    }
}

const STUDY_TYPES: &[(&str, &str)] = &[
    ("01", "Radiografia"),
    ("02", "Tomografia Computarizada"),
    ("03", "Resonancia Magnetica"),
    ("04", "Ultrasonido"),
    ("05", "Mamografia"),
    ("06", "Angiografia"),
    ("07", "Medicina Nuclear"),
    ("08", "Radio Terapia"),
    ("09", "Fluoroscopia"),
];

const REGIONS: &[(&str, &str)] = &[
    ("00", "Desconocido"),
    ("01", "Cabeza"),
    ("02", "Cuello"),
    ("03", "Torax"),
    ("04", "Pelvis"),
    ("05", "Brazo"),
    ("06", "Manos"),
    ("07", "Piernas"),
    ("08", "Rodilla"),
    ("09", "Tobillo"),
    ("10", "Pie"),
];

const PROJECTIONS: &[(&str, &str)] = &[
    ("00", "Desconocido"),
    ("01", "Postero Anterior"),
    ("02", "Antero Posterior"),
    ("03", "Obliqua"),
    ("04", "Lateral Izquierda"),
    ("05", "Lateral Derecha"),
    ("06", "Especial"),
];

const VALIDITY: &[(&str, &str)] = &[("0", "Si"), ("1", "No")];

const ORIGINS: &[(&str, &str)] = &[
    ("0", "Natural (imagenes tomadas a pacientes)"),
    ("1", "Sintetico (imagenes generadas por IA)"),
];

const ACQUISITION_CHANNELS: &[(&str, &str)] = &[
    ("0", "Donacion de empresa"),
    ("1", "Donacion fisica"),
    ("2", "Donacion digital"),
];

const SEXES: &[(&str, &str)] = &[("0", "Desconocido"), ("1", "Masculino"), ("2", "Femenino")];

const AGE_BRACKETS: &[(&str, &str)] = &[
    ("0", "Desconocido"),
    ("1", "Lactantes (menores de 1 año)"),
    ("2", "Prescolar (1 a 5 años)"),
    ("3", "Infante (6 a 12 años)"),
    ("4", "Adolescente (13 a 18 años)"),
    ("5", "Adulto joven (19 a 26 años)"),
    ("6", "Adulto (27 a 59 años)"),
    ("7", "Adulto mayor (60 años y mas)"),
];

/// The eight positional fields of a classification key
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyFields {
    /// Study type code (2 characters)
    pub study_type: String,
    /// Body region code (2 characters)
    pub region: String,
    /// Projection code (2 characters)
    pub projection: String,
    /// Validity code (1 character)
    pub validity: String,
    /// Origin code (1 character)
    pub origin: String,
    /// Acquisition channel code (1 character)
    pub acquisition: String,
    /// Sex code (1 character)
    pub sex: String,
    /// Age bracket code (1 character)
    pub age_bracket: String,
}

impl KeyFields {
    /// The value stored for a field
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::StudyType => &self.study_type,
            Field::Region => &self.region,
            Field::Projection => &self.projection,
            Field::Validity => &self.validity,
            Field::Origin => &self.origin,
            Field::Acquisition => &self.acquisition,
            Field::Sex => &self.sex,
            Field::AgeBracket => &self.age_bracket,
        }
    }
}

/// Concatenate the eight fields into a key, validating each one
pub fn encode(fields: &KeyFields) -> Result<String> {
    let mut key = String::with_capacity(KEY_LEN);
    for field in Field::ALL {
        let value = fields.get(field);
        field.validate(value)?;
        key.push_str(value);
    }
    Ok(key)
}

/// Split a key into its eight fields, validating each one
pub fn decode(key: &str) -> Result<KeyFields> {
    if !key.is_ascii() {
        return Err(Error::MalformedKey {
            key: key.to_string(),
            reason: "contains non-ASCII characters".to_string(),
        });
    }
    if key.len() != KEY_LEN {
        return Err(Error::MalformedKey {
            key: key.to_string(),
            reason: format!("expected {KEY_LEN} characters, found {}", key.len()),
        });
    }

    let slice = |field: Field| -> Result<String> {
        let value = &key[field.offset()..field.offset() + field.width()];
        field.validate(value)?;
        Ok(value.to_string())
    };

    Ok(KeyFields {
        study_type: slice(Field::StudyType)?,
        region: slice(Field::Region)?,
        projection: slice(Field::Projection)?,
        validity: slice(Field::Validity)?,
        origin: slice(Field::Origin)?,
        acquisition: slice(Field::Acquisition)?,
        sex: slice(Field::Sex)?,
        age_bracket: slice(Field::AgeBracket)?,
    })
}

/// First four characters of a key (study type + region)
pub fn group_prefix(key: &str) -> Result<&str> {
    key.get(..GROUP_PREFIX_LEN).ok_or_else(|| Error::MalformedKey {
        key: key.to_string(),
        reason: format!("shorter than the {GROUP_PREFIX_LEN}-character group prefix"),
    })
}

/// Archive filename for an image: `{key}_{serial:04}.{extension}`
pub fn file_name(key: &str, serial: u32, extension: &str) -> String {
    format!("{key}_{serial:04}.{extension}")
}
