mod publish;
mod render;

pub(crate) use publish::{ensure_builder, preflight, publish};
pub(crate) use render::{list_receipts, print_tags, render};
