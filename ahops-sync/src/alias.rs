//! Para ids that were swapped between projects over time share one display label.

struct SwapGroup {
    members: &'static [&'static str],
    tooltip: &'static str,
}

// every para id belongs to at most one group
const SWAP_GROUPS: &[SwapGroup] = &[SwapGroup {
    members: &["2043", "3360"],
    tooltip: "Para IDs 2043 and 3360 were swapped. Funds locked under either ID may belong to the \
              same project.",
}];

/// How a para id is shown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParaIdDisplay {
    /// label to render in place of the raw id
    pub label: String,
    /// explanation for aliased ids
    pub tooltip: Option<&'static str>,
}

/// Exact-match lookup; unmapped ids display as-is.
pub fn display_para_id(para_id: &str) -> ParaIdDisplay {
    match SWAP_GROUPS
        .iter()
        .find(|group| group.members.contains(&para_id))
    {
        Some(group) => ParaIdDisplay {
            label: group.members.join(" / "),
            tooltip: Some(group.tooltip),
        },
        None => ParaIdDisplay {
            label: para_id.to_string(),
            tooltip: None,
        },
    }
}
