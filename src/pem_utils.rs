/// Convert DER‑encoded data into a PEM‑encoded string with the provided label.
///
/// Lines are 64 characters wide and end in LF.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(
        &pem,
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}

/// Convert a file holding exactly one PEM block labelled `expected_label` to DER.
///
/// The error is a human readable reason. Only whitespace may follow the block.
pub fn pem_to_der(pem_str: &str, expected_label: &str) -> Result<Vec<u8>, String> {
    let blocks = pem::parse_many(pem_str).map_err(|e| e.to_string())?;
    let [block] = blocks.as_slice() else {
        return Err(format!(
            "expected exactly one PEM block, found {}",
            blocks.len()
        ));
    };

    if block.tag() != expected_label {
        return Err(format!(
            "wrong header {:?}, expected {expected_label:?}",
            block.tag()
        ));
    }

    let end_marker = format!("-----END {}-----", block.tag());
    let trailing = pem_str
        .rfind(&end_marker)
        .map(|end| &pem_str[end + end_marker.len()..])
        .unwrap_or_default();
    if !trailing.trim().is_empty() {
        return Err("has extra data after the PEM block".to_string());
    }

    Ok(block.contents().to_vec())
}
