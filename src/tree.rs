/// Mark the accession's leaf as the foreground branch by suffixing
/// every occurrence of the literal accession with the engine's `#1`
/// marker. Returns `None` when the tree text does not mention the
/// accession at all, which skips the accession rather than running the
/// engine on an unlabelled tree.
///
/// Matching is on the literal substring, so labelling a tree twice
/// would corrupt the marker. Callers label a fresh copy per run.
pub fn label(tree_text: &str, accession: &str) -> Option<String> {
    if !tree_text.contains(accession) {
        return None;
    }

    Some(tree_text.replace(accession, &format!("{accession} #1")))
}
