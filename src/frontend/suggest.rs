use strsim::jaro_winkler;

/// Closest candidate by Jaro-Winkler similarity, if any clears the bar.
pub fn best_name_match<'a>(needle: &str, candidates: &'a [String]) -> Option<&'a str> {
    let mut best: Option<(&str, f64)> = None;
    for c in candidates {
        let score = jaro_winkler(needle, c);
        if best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((c.as_str(), score));
        }
    }
    match best {
        Some((name, score)) if score >= 0.84 => Some(name),
        _ => None,
    }
}

pub fn help_did_you_mean(suggestion: &str) -> String {
    format!("help: did you mean \"{}\"?", suggestion)
}
