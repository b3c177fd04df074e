pub mod optimize;
pub mod statistics;

/// Normalise `--symbols`: trimmed, upper-cased, de-duplicated in order.
pub(crate) fn parse_symbols(raw: &[String]) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut symbols: Vec<String> = Vec::with_capacity(raw.len());
    for s in raw {
        let sym = s.trim().to_uppercase();
        if !sym.is_empty() && !symbols.contains(&sym) {
            symbols.push(sym);
        }
    }
    if symbols.is_empty() {
        return Err("--symbols requires at least one ticker".into());
    }
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_symbols_normalises() {
        let raw: Vec<String> = vec![" aapl".into(), "MSFT".into(), "".into(), "AAPL".into()];
        assert_eq!(parse_symbols(&raw).unwrap(), vec!["AAPL".to_string(), "MSFT".to_string()]);
    }

    #[test]
    fn test_parse_symbols_rejects_empty() {
        assert!(parse_symbols(&[" ".to_string()]).is_err());
    }
}
