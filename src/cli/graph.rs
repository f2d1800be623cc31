// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Graph command - visualize script dependencies

use miette::Result;
use std::path::PathBuf;

use super::{load_plan, GraphFormat};
use crate::pipeline::PlanGraph;

/// Run the graph command
pub async fn run(manifest: PathBuf, format: GraphFormat, _verbose: bool) -> Result<()> {
    let plan = load_plan(&manifest).await?;

    for pipeline in &plan.pipelines {
        let graph = PlanGraph::build(pipeline);
        let output = match format {
            GraphFormat::Text => graph.to_text(),
            GraphFormat::Dot => graph.to_dot(),
            GraphFormat::Mermaid => graph.to_mermaid(),
        };
        println!("{}", output);
    }

    Ok(())
}
