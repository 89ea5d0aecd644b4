use std::fmt;

/// Charge, multiplicity and coordinates read out of a Gaussian input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GjfMolecule {
    pub charge: i32,
    pub multiplicity: i32,
    pub structure_xyz: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GjfError {
    /// Route, title and molecule sections were not all present
    TooFewSections(usize),
    BadChargeLine(String),
}

impl fmt::Display for GjfError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GjfError::TooFewSections(n) => write!(
                f,
                "malformed GJF file: expected route, title and molecule sections, found {n}"
            ),
            GjfError::BadChargeLine(line) => write!(
                f,
                "malformed charge/multiplicity line `{line}`, expected two integers"
            ),
        }
    }
}

impl std::error::Error for GjfError {}

// A GJF file is a series of blank-line separated sections:
//   %chk / #route        <- section 0
//   title                <- section 1
//   charge multiplicity  <- section 2, first line
//   atom x y z ...       <- section 2, remaining lines
// Anything after the molecule section (basis sets, modredundant input) is ignored.
pub fn parse_gjf(content: &str) -> Result<GjfMolecule, GjfError> {
    let mut sections: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in content.trim().lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                sections.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        sections.push(current);
    }

    if sections.len() < 3 {
        return Err(GjfError::TooFewSections(sections.len()));
    }

    let molecule = &sections[2];
    let charge_line = molecule[0];
    let fields: Vec<&str> = charge_line.split_whitespace().collect();
    let &[charge, multiplicity] = fields.as_slice() else {
        return Err(GjfError::BadChargeLine(charge_line.trim().to_string()));
    };
    let (Ok(charge), Ok(multiplicity)) = (charge.parse::<i32>(), multiplicity.parse::<i32>()) else {
        return Err(GjfError::BadChargeLine(charge_line.trim().to_string()));
    };

    Ok(GjfMolecule {
        charge,
        multiplicity,
        structure_xyz: molecule[1..].join("\n"),
    })
}

/// Parses `key=value` pairs into a settings object. Values are read as JSON when they parse,
/// otherwise kept as strings, so `nproc=8` gives a number and `method=B3LYP` a string.
pub fn parse_settings(pairs: &[String]) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
    let mut settings = serde_json::Map::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Expected key=value, got {pair}"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow::anyhow!("Empty setting name in {pair}"));
        }
        let value = serde_json::from_str(value.trim())
            .unwrap_or_else(|_| serde_json::Value::String(value.trim().to_string()));
        settings.insert(key.to_string(), value);
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WATER: &str = "%chk=water.chk
#p B3LYP/6-31G(d) opt

water optimisation

0 1
O   0.000000   0.000000   0.117300
H   0.000000   0.757200  -0.469200
H   0.000000  -0.757200  -0.469200

";

    #[test]
    fn parses_molecule_section() {
        let m = parse_gjf(WATER).unwrap();
        assert_eq!(m.charge, 0);
        assert_eq!(m.multiplicity, 1);
        assert_eq!(m.structure_xyz.lines().count(), 3);
        assert!(m.structure_xyz.starts_with("O "));
    }

    #[test]
    fn ignores_trailing_sections_and_extra_blank_lines() {
        let content = "#p opt=modredundant\n\n\n\ncation\n\n1 2\nC 0 0 0\n\nB 1 2 F\n";
        let m = parse_gjf(content).unwrap();
        assert_eq!((m.charge, m.multiplicity), (1, 2));
        assert_eq!(m.structure_xyz, "C 0 0 0");
    }

    #[test]
    fn rejects_missing_sections() {
        assert_eq!(
            parse_gjf("#p sp\n\ntitle only\n"),
            Err(GjfError::TooFewSections(2))
        );
        assert_eq!(parse_gjf(""), Err(GjfError::TooFewSections(0)));
    }

    #[test]
    fn rejects_bad_charge_line() {
        let err = parse_gjf("#p sp\n\nt\n\n0 1 2\nH 0 0 0\n").unwrap_err();
        assert_eq!(err, GjfError::BadChargeLine("0 1 2".into()));
        let err = parse_gjf("#p sp\n\nt\n\nzero one\nH 0 0 0\n").unwrap_err();
        assert!(err.to_string().contains("zero one"));
    }

    #[test]
    fn settings_values_are_typed_when_possible() {
        let pairs = vec![
            "method=B3LYP".to_string(),
            "nproc = 8".to_string(),
            "tight=true".to_string(),
        ];
        let settings = parse_settings(&pairs).unwrap();
        assert_eq!(settings["method"], json!("B3LYP"));
        assert_eq!(settings["nproc"], json!(8));
        assert_eq!(settings["tight"], json!(true));

        assert!(parse_settings(&["novalue".to_string()]).is_err());
        assert!(parse_settings(&["=1".to_string()]).is_err());
    }
}
