use crate::error::{InsightError, Result};

const ABBREVIATIONS: &[(&str, &str)] = &[
    ("AN", "Andaman and Nicobar Islands"),
    ("AP", "Andhra Pradesh"),
    ("AR", "Arunachal Pradesh"),
    ("AS", "Assam"),
    ("CH", "Chandigarh"),
    ("CT", "Chhattisgarh"),
    ("DD", "Dadra and Nagar Haveli and Daman and Diu"),
    ("DL", "Delhi"),
    ("GA", "Goa"),
    ("GJ", "Gujarat"),
    ("HP", "Himachal Pradesh"),
    ("HR", "Haryana"),
    ("JH", "Jharkhand"),
    ("JK", "Jammu and Kashmir"),
    ("KA", "Karnataka"),
    ("KL", "Kerala"),
    ("LA", "Ladakh"),
    ("LK", "Lakshadweep"),
    ("MH", "Maharashtra"),
    ("ML", "Meghalaya"),
    ("MN", "Manipur"),
    ("MP", "Madhya Pradesh"),
    ("MZ", "Mizoram"),
    ("NL", "Nagaland"),
    ("OR", "Odisha"),
    ("PB", "Punjab"),
    ("PY", "Puducherry"),
    ("RJ", "Rajasthan"),
    ("SK", "Sikkim"),
    ("TN", "Tamil Nadu"),
    ("TR", "Tripura"),
    ("TS", "Telangana"),
    ("UK", "Uttarakhand"),
    ("UP", "Uttar Pradesh"),
    ("WB", "West Bengal"),
];

const VARIANTS: &[(&str, &str)] = &[
    ("NCT OF DELHI", "Delhi"),
    ("NATIONAL CAPITAL TERRITORY OF DELHI", "Delhi"),
    ("NEW DELHI", "Delhi"),
    ("DADRA AND NAGAR HAVELI", "Dadra and Nagar Haveli and Daman and Diu"),
    ("DAMAN AND DIU", "Dadra and Nagar Haveli and Daman and Diu"),
    ("DADRA & NAGAR HAVELI", "Dadra and Nagar Haveli and Daman and Diu"),
    ("DAMAN & DIU", "Dadra and Nagar Haveli and Daman and Diu"),
    ("DNH", "Dadra and Nagar Haveli and Daman and Diu"),
    ("ORISSA", "Odisha"),
    ("PONDICHERRY", "Puducherry"),
    ("UTTARANCHAL", "Uttarakhand"),
    ("ANDAMAN & NICOBAR", "Andaman and Nicobar Islands"),
    ("ANDAMAN & NICOBAR ISLANDS", "Andaman and Nicobar Islands"),
];

const PLACEHOLDERS: &[&str] = &[
    "", "NA", "N/A", "UNKNOWN", "NULL", "-", "0", "NONE", "NOT AVAILABLE", "NOT SPECIFIED",
];

/// Maps user or source spellings onto one canonical state name.
pub fn resolve_state(input: &str) -> Result<String> {
    let collapsed = collapse_whitespace(input);
    let upper = collapsed.to_uppercase();

    if PLACEHOLDERS.contains(&upper.as_str()) {
        return Err(InsightError::UnknownState(input.to_string()));
    }
    if let Some((_, name)) = ABBREVIATIONS.iter().find(|(abbr, _)| *abbr == upper) {
        return Ok(name.to_string());
    }
    if let Some((_, name)) = VARIANTS.iter().find(|(variant, _)| *variant == upper) {
        return Ok(name.to_string());
    }
    if let Some((_, name)) = ABBREVIATIONS
        .iter()
        .find(|(_, name)| name.to_uppercase() == upper)
    {
        return Ok(name.to_string());
    }
    Ok(title_case(&collapsed))
}

/// District names only get whitespace and casing cleanup.
pub fn normalize_district(input: &str) -> String {
    title_case(&collapse_whitespace(input))
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn title_case(input: &str) -> String {
    input
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
