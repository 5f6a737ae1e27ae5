//! Semantic name resolution for the tool layer.
//!
//! LLM callers say "TX", "wash", or "broadband"; the store holds canonical
//! state names and program areas. These heuristics map the former to the
//! latter. They are deliberately outside the core query layer: core
//! operations accept canonical names only, and a harness calling the core
//! directly never goes through here.

const STATE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("AL", "Alabama"),
    ("AK", "Alaska"),
    ("AZ", "Arizona"),
    ("AR", "Arkansas"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DE", "Delaware"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("HI", "Hawaii"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("IA", "Iowa"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("ME", "Maine"),
    ("MD", "Maryland"),
    ("MA", "Massachusetts"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MS", "Mississippi"),
    ("MO", "Missouri"),
    ("MT", "Montana"),
    ("NE", "Nebraska"),
    ("NV", "Nevada"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NY", "New York"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VT", "Vermont"),
    ("VA", "Virginia"),
    ("WA", "Washington"),
    ("WV", "West Virginia"),
    ("WI", "Wisconsin"),
    ("WY", "Wyoming"),
    ("DC", "District of Columbia"),
    ("PR", "Puerto Rico"),
    ("VI", "Virgin Islands"),
    ("GU", "Guam"),
    ("AS", "American Samoa"),
    ("MP", "Northern Mariana Islands"),
];

const STATE_VARIATIONS: &[(&str, &str)] = &[
    ("washington state", "Washington"),
    ("wash", "Washington"),
    ("west va", "West Virginia"),
    ("wva", "West Virginia"),
    ("n carolina", "North Carolina"),
    ("s carolina", "South Carolina"),
    ("n dakota", "North Dakota"),
    ("s dakota", "South Dakota"),
    ("new mex", "New Mexico"),
    ("mass", "Massachusetts"),
];

/// Canonical top-level program areas in the dataset.
pub const PROGRAM_AREAS: &[&str] = &[
    "Electric Programs",
    "Single Family Housing",
    "Business Programs",
    "Multifamily Housing",
    "Telecommunications Programs",
    "Water and Environmental",
    "Community Facilities",
];

const PROGRAM_SYNONYMS: &[(&str, &str)] = &[
    ("electric", "Electric Programs"),
    ("electricity", "Electric Programs"),
    ("power", "Electric Programs"),
    ("utility", "Electric Programs"),
    ("utilities", "Electric Programs"),
    ("energy", "Electric Programs"),
    // "housing" alone defaults to single family
    ("housing", "Single Family Housing"),
    ("single family", "Single Family Housing"),
    ("single-family", "Single Family Housing"),
    ("sfh", "Single Family Housing"),
    ("home", "Single Family Housing"),
    ("homes", "Single Family Housing"),
    ("residential", "Single Family Housing"),
    ("multifamily", "Multifamily Housing"),
    ("multi-family", "Multifamily Housing"),
    ("mfh", "Multifamily Housing"),
    ("apartment", "Multifamily Housing"),
    ("apartments", "Multifamily Housing"),
    ("business", "Business Programs"),
    ("businesses", "Business Programs"),
    ("commercial", "Business Programs"),
    ("enterprise", "Business Programs"),
    ("economic development", "Business Programs"),
    ("telecom", "Telecommunications Programs"),
    ("telecommunications", "Telecommunications Programs"),
    ("broadband", "Telecommunications Programs"),
    ("internet", "Telecommunications Programs"),
    ("connectivity", "Telecommunications Programs"),
    ("communication", "Telecommunications Programs"),
    ("water", "Water and Environmental"),
    ("environmental", "Water and Environmental"),
    ("wastewater", "Water and Environmental"),
    ("sewer", "Water and Environmental"),
    ("environment", "Water and Environmental"),
    ("clean water", "Water and Environmental"),
    ("community", "Community Facilities"),
    ("facilities", "Community Facilities"),
    ("public", "Community Facilities"),
];

/// Resolve a location string to a canonical state name. Unknown input is
/// title-cased and passed through so the query layer can return an empty
/// result rather than this layer guessing wrong.
pub fn resolve_state(input: &str) -> String {
    let clean = input.trim();
    let upper = clean.to_ascii_uppercase();

    if let Some((_, name)) = STATE_ABBREVIATIONS.iter().find(|(abbr, _)| *abbr == upper) {
        return (*name).to_string();
    }

    let lower = clean.to_lowercase();
    if let Some((_, name)) = STATE_VARIATIONS.iter().find(|(variant, _)| *variant == lower) {
        return (*name).to_string();
    }

    if let Some((_, name)) = STATE_ABBREVIATIONS
        .iter()
        .find(|(_, name)| name.to_lowercase() == lower)
    {
        return (*name).to_string();
    }

    title_case(clean)
}

/// Resolve a program string to a canonical program area.
pub fn resolve_program(input: &str) -> String {
    let clean = input.trim();
    let lower = clean.to_lowercase();

    if let Some((_, area)) = PROGRAM_SYNONYMS.iter().find(|(syn, _)| *syn == lower) {
        return (*area).to_string();
    }

    if let Some(area) = PROGRAM_AREAS
        .iter()
        .find(|area| area.to_lowercase() == lower)
    {
        return (*area).to_string();
    }

    // Partial match in either direction ("telecommunications" vs
    // "Telecommunications Programs")
    if let Some(area) = PROGRAM_AREAS.iter().find(|area| {
        let area_lower = area.to_lowercase();
        area_lower.contains(&lower) || lower.contains(&area_lower)
    }) {
        return (*area).to_string();
    }

    title_case(clean)
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbreviations() {
        assert_eq!(resolve_state("TX"), "Texas");
        assert_eq!(resolve_state("ca"), "California");
        assert_eq!(resolve_state(" wa "), "Washington");
    }

    #[test]
    fn test_state_variations_and_passthrough() {
        assert_eq!(resolve_state("wash"), "Washington");
        assert_eq!(resolve_state("n dakota"), "North Dakota");
        assert_eq!(resolve_state("texas"), "Texas");
        assert_eq!(resolve_state("atlantis"), "Atlantis");
        assert_eq!(resolve_state("new sweden"), "New Sweden");
    }

    #[test]
    fn test_program_synonyms() {
        assert_eq!(resolve_program("broadband"), "Telecommunications Programs");
        assert_eq!(resolve_program("housing"), "Single Family Housing");
        assert_eq!(resolve_program("MFH"), "Multifamily Housing");
        assert_eq!(resolve_program("clean water"), "Water and Environmental");
    }

    #[test]
    fn test_program_partial_match() {
        assert_eq!(resolve_program("electric"), "Electric Programs");
        assert_eq!(
            resolve_program("telecommunications"),
            "Telecommunications Programs"
        );
        assert_eq!(resolve_program("community facilities"), "Community Facilities");
    }

    #[test]
    fn test_unknown_program_passthrough() {
        assert_eq!(resolve_program("space lasers"), "Space Lasers");
    }
}
