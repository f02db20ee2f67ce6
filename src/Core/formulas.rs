use std::collections::HashMap;
use thiserror::Error;

// Define a struct to hold element data
pub struct Element {
    name: &'static str,
    atomic_mass: f64,
}

// Define a list of elements and their atomic masses
const ELEMENTS: &[Element] = &[
    Element {
        name: "H",
        atomic_mass: 1.008,
    },
    Element {
        name: "He",
        atomic_mass: 4.0026,
    },
    Element {
        name: "Li",
        atomic_mass: 6.94,
    },
    Element {
        name: "Be",
        atomic_mass: 9.0122,
    },
    Element {
        name: "B",
        atomic_mass: 10.81,
    },
    Element {
        name: "C",
        atomic_mass: 12.011,
    },
    Element {
        name: "N",
        atomic_mass: 14.007,
    },
    Element {
        name: "O",
        atomic_mass: 15.999,
    },
    Element {
        name: "F",
        atomic_mass: 18.998,
    },
    Element {
        name: "Ne",
        atomic_mass: 20.18,
    },
    Element {
        name: "Na",
        atomic_mass: 22.99,
    },
    Element {
        name: "Mg",
        atomic_mass: 24.305,
    },
    Element {
        name: "Al",
        atomic_mass: 26.98,
    },
    Element {
        name: "Si",
        atomic_mass: 28.085,
    },
    Element {
        name: "P",
        atomic_mass: 30.974,
    },
    Element {
        name: "S",
        atomic_mass: 32.065,
    },
    Element {
        name: "Cl",
        atomic_mass: 35.45,
    },
    Element {
        name: "Ar",
        atomic_mass: 39.948,
    },
    Element {
        name: "K",
        atomic_mass: 39.102,
    },
    Element {
        name: "Ca",
        atomic_mass: 40.08,
    },
    Element {
        name: "Ti",
        atomic_mass: 47.867,
    },
    Element {
        name: "Cr",
        atomic_mass: 51.9961,
    },
    Element {
        name: "Mn",
        atomic_mass: 54.938,
    },
    Element {
        name: "Fe",
        atomic_mass: 55.845,
    },
    Element {
        name: "Ni",
        atomic_mass: 58.693,
    },
    Element {
        name: "Cu",
        atomic_mass: 63.546,
    },
    Element {
        name: "Zn",
        atomic_mass: 65.38,
    },
    Element {
        name: "Br",
        atomic_mass: 79.904,
    },
    Element {
        name: "Sr",
        atomic_mass: 87.62,
    },
    Element {
        name: "Ag",
        atomic_mass: 107.87,
    },
    Element {
        name: "I",
        atomic_mass: 126.9,
    },
    Element {
        name: "Ba",
        atomic_mass: 137.33,
    },
    Element {
        name: "Pb",
        atomic_mass: 207.2,
    },
    Element {
        name: "U",
        atomic_mass: 238.03,
    },
    // electric charge is carried by formulae of ions, e.g. "HCO3-" or "Ca+2";
    // it participates in balances with zero mass
    Element {
        name: "Z",
        atomic_mass: 0.0,
    },
];

#[derive(Debug, Error)]
pub enum FormulaError {
    #[error("Unknown element: {0}")]
    UnknownElement(String),
    #[error("Cannot parse formula '{formula}': {reason}")]
    ParseError { formula: String, reason: String },
}

/// atomic mass of an element symbol in g/mol, None if the symbol is not in the table
pub fn atomic_mass(symbol: &str) -> Option<f64> {
    ELEMENTS
        .iter()
        .find(|e| e.name == symbol)
        .map(|e| e.atomic_mass)
}

/// Parse a chemical formula like "CaCO3", "Na(NO3)2" or "HCO3-" into a map
/// {element symbol => stoichiometric count}. Counts may be fractional ("Fe0.947O").
/// A trailing charge suffix ("+", "-", "+2", "-3") is recorded under the pseudo-element "Z".
pub fn parse_formula(formula: &str) -> Result<HashMap<String, f64>, FormulaError> {
    let chars: Vec<char> = formula.chars().collect();
    // stack of composition maps, one per open parenthesis
    let mut stack: Vec<HashMap<String, f64>> = vec![HashMap::new()];
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '(' {
            stack.push(HashMap::new());
            i += 1;
        } else if c == ')' {
            i += 1;
            let (count, next) = read_number(&chars, i);
            i = next;
            let group = stack.pop().ok_or_else(|| FormulaError::ParseError {
                formula: formula.to_string(),
                reason: "unbalanced parentheses".to_string(),
            })?;
            let top = stack.last_mut().ok_or_else(|| FormulaError::ParseError {
                formula: formula.to_string(),
                reason: "unbalanced parentheses".to_string(),
            })?;
            for (el, cnt) in group {
                *top.entry(el).or_insert(0.0) += cnt * count.unwrap_or(1.0);
            }
        } else if c == '+' || c == '-' {
            // charge suffix, must terminate the formula
            i += 1;
            let (count, next) = read_number(&chars, i);
            if next != chars.len() {
                return Err(FormulaError::ParseError {
                    formula: formula.to_string(),
                    reason: "charge suffix must be last".to_string(),
                });
            }
            i = next;
            let sign = if c == '+' { 1.0 } else { -1.0 };
            if let Some(top) = stack.last_mut() {
                *top.entry("Z".to_string()).or_insert(0.0) += sign * count.unwrap_or(1.0);
            }
        } else if c.is_ascii_uppercase() {
            let mut symbol = c.to_string();
            i += 1;
            while i < chars.len() && chars[i].is_ascii_lowercase() {
                symbol.push(chars[i]);
                i += 1;
            }
            let (count, next) = read_number(&chars, i);
            i = next;
            if let Some(top) = stack.last_mut() {
                *top.entry(symbol).or_insert(0.0) += count.unwrap_or(1.0);
            }
        } else {
            return Err(FormulaError::ParseError {
                formula: formula.to_string(),
                reason: format!("unexpected character '{}'", c),
            });
        }
    }
    if stack.len() != 1 {
        return Err(FormulaError::ParseError {
            formula: formula.to_string(),
            reason: "unbalanced parentheses".to_string(),
        });
    }
    let composition = stack.pop().unwrap_or_default();
    if composition.is_empty() {
        return Err(FormulaError::ParseError {
            formula: formula.to_string(),
            reason: "empty formula".to_string(),
        });
    }
    Ok(composition)
}

// reads an (optionally fractional) number starting at position i; None if there is no digit
fn read_number(chars: &[char], mut i: usize) -> (Option<f64>, usize) {
    let start = i;
    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
        i += 1;
    }
    if i == start {
        return (None, i);
    }
    let s: String = chars[start..i].iter().collect();
    match s.parse::<f64>() {
        Ok(v) => (Some(v), i),
        Err(_) => (None, start),
    }
}

/// molar mass in g/mol of a parsed elemental composition
pub fn molar_mass_of(composition: &HashMap<String, f64>) -> Result<f64, FormulaError> {
    let mut mass = 0.0;
    for (el, cnt) in composition {
        let m = atomic_mass(el).ok_or_else(|| FormulaError::UnknownElement(el.clone()))?;
        mass += m * cnt;
    }
    Ok(mass)
}

/// parse a formula and calculate its molar mass in one go
pub fn calculate_molar_mass(formula: &str) -> Result<(f64, HashMap<String, f64>), FormulaError> {
    let composition = parse_formula(formula)?;
    let mass = molar_mass_of(&composition)?;
    Ok((mass, composition))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_simple() {
        let comp = parse_formula("H2O").unwrap();
        assert_eq!(comp.get("H"), Some(&2.0));
        assert_eq!(comp.get("O"), Some(&1.0));
    }

    #[test]
    fn test_parse_parentheses() {
        let comp = parse_formula("Na(NO3)2").unwrap();
        assert_eq!(comp.get("Na"), Some(&1.0));
        assert_eq!(comp.get("N"), Some(&2.0));
        assert_eq!(comp.get("O"), Some(&6.0));
    }

    #[test]
    fn test_parse_charge() {
        let comp = parse_formula("HCO3-").unwrap();
        assert_eq!(comp.get("Z"), Some(&-1.0));
        let comp = parse_formula("Ca+2").unwrap();
        assert_eq!(comp.get("Z"), Some(&2.0));
        assert_eq!(comp.get("Ca"), Some(&1.0));
    }

    #[test]
    fn test_parse_fractional() {
        let comp = parse_formula("Fe0.947O").unwrap();
        assert_relative_eq!(*comp.get("Fe").unwrap(), 0.947, max_relative = 1e-12);
    }

    #[test]
    fn test_molar_mass() {
        let (mass, _) = calculate_molar_mass("H2O").unwrap();
        assert_relative_eq!(mass, 18.015, max_relative = 1e-3);
        let (mass, _) = calculate_molar_mass("CaCO3").unwrap();
        assert_relative_eq!(mass, 100.088, max_relative = 1e-3);
    }

    #[test]
    fn test_unknown_element() {
        let comp = parse_formula("Xx2O").unwrap();
        assert!(molar_mass_of(&comp).is_err());
    }

    #[test]
    fn test_bad_formula() {
        assert!(parse_formula("Na(NO3").is_err());
        assert!(parse_formula("").is_err());
        assert!(parse_formula("Na+2Cl").is_err());
    }
}
