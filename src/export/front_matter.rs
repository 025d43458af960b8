//! Fixed documents written at the top of every dataset archive.

use std::io::{Seek, Write};

use super::archive::ArchiveWriter;
use crate::classification::{Field, KEY_LEN};
use crate::error::Result;

/// Archive path of the dataset README
pub const README_PATH: &str = "README.txt";

/// Archive path of the naming-convention document
pub const NAME_CONVENTION_PATH: &str = "metadatos/nameconvention.txt";

const README: &str = "\
Este dataset contiene estudios de imagenes medicas anonimizadas.
Los archivos estan nombrados siguiendo una convencion que describe el tipo de estudio,
la region del cuerpo, la proyeccion, la validez de la imagen, su origen, su obtencion,
el sexo y la edad del paciente; la convencion se describe en \"metadatos/nameconvention.txt\".

Los diagnosticos de cada grupo de imagenes estan en la carpeta \"metadata\".
";

/// The dataset README
pub fn readme() -> &'static str {
    README
}

/// Naming-convention document generated from the classification tables
pub fn name_convention(extension: &str) -> String {
    let mut lines = vec![
        format!(
            "Cada archivo tiene el siguiente formato: \
             <tipo de estudio><region><proyeccion><valida><origen><obtencion><sexo><edad>_<identificador_secuencial>.{extension}"
        ),
        format!("Ejemplo: 01020511100_0001.{extension}"),
        "Desglose del nombre:".to_string(),
    ];

    for field in Field::ALL {
        let first = field.offset() + 1;
        let last = field.offset() + field.width();
        lines.push(if first == last {
            format!("- Caracter {first}: {}", field.title())
        } else {
            format!("- Caracter {first} y {last}: {}", field.title())
        });
        lines.extend(
            field
                .codes()
                .iter()
                .map(|(code, label)| format!("    {code} - {label}")),
        );
    }
    lines.push(format!(
        "- Caracter {}: separador \"_\" seguido del identificador secuencial (minimo 4 digitos)",
        KEY_LEN + 1
    ));

    let mut doc = lines.join("\n");
    doc.push('\n');
    doc
}

/// Write the README and naming-convention entries
///
/// The caller must hold the archive lock.
pub fn write_front_matter<W: Write + Seek>(
    archive: &mut ArchiveWriter<W>,
    extension: &str,
) -> Result<()> {
    archive.write_entry(README_PATH, readme().as_bytes())?;
    archive.write_entry(NAME_CONVENTION_PATH, name_convention(extension).as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_convention_lists_every_code() {
        let doc = name_convention("dcm");

        assert!(doc.contains("_<identificador_secuencial>.dcm"));
        assert!(doc.contains("- Caracter 1 y 2: Tipo de estudio"));
        assert!(doc.contains("- Caracter 11: Edad (rango de edades)"));
        for field in Field::ALL {
            for (code, label) in field.codes() {
                assert!(
                    doc.contains(&format!("    {code} - {label}")),
                    "{} code {code} missing",
                    field.name()
                );
            }
        }
    }

    #[test]
    fn name_convention_is_newline_terminated_lines() {
        let doc = name_convention("dcm");
        let lines: Vec<&str> = doc.lines().collect();

        assert!(doc.ends_with("(minimo 4 digitos)\n"));
        assert!(!doc.contains("\n\n"));
        assert_eq!(lines[1], "Ejemplo: 01020511100_0001.dcm");
        assert_eq!(lines[2], "Desglose del nombre:");
        assert!(lines[lines.len() - 1].starts_with("- Caracter 12: separador"));
    }

    #[test]
    fn name_convention_follows_requested_extension() {
        assert!(name_convention("jpg").contains("Ejemplo: 01020511100_0001.jpg"));
    }
}
