//! Question-to-chart scenarios with scripted collaborators.

use crate::agent::TabularAgent;
use crate::explainer::ChartExplainer;
use crate::generator::ChartCodeGenerator;
use crate::pipeline::{ChartArtifact, ChartPipeline};
use crate::sandbox::SandboxRenderer;
use crate::testing::{ScriptedAgent, ScriptedLlm};
use base64::Engine;
use ragchart_core::ChartSettings;
use ragchart_prompt::PromptLibrary;
use std::sync::Arc;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const BAR_CODE: &str = "Here is the chart:\n\n```python\nlabels = ['North', 'South']\nvalues = [120, 80]\n\nimport matplotlib.pyplot as plt\nimport seaborn as sns\n\nplt.figure(figsize=(8, 5))\nplt.bar(labels, values, color='steelblue')\nplt.title('Sales by region')\nplt.xlabel('Region')\nplt.ylabel('Sales')\nplt.tight_layout()\nplt.show()\n```";

fn pipeline(agent: Arc<dyn TabularAgent>, llm: Arc<ScriptedLlm>) -> ChartPipeline {
    let prompts = Arc::new(PromptLibrary::builtin().unwrap());
    let renderer = SandboxRenderer::new(&ChartSettings {
        dpi: 20,
        ..ChartSettings::default()
    })
    .unwrap();

    ChartPipeline::new(
        agent,
        ChartCodeGenerator::new(llm.clone(), prompts.clone(), "test-model"),
        renderer,
        ChartExplainer::new(llm, prompts, "test-model"),
    )
}

fn assert_both_or_neither(artifact: &ChartArtifact) {
    assert_eq!(artifact.narrative().is_some(), artifact.image().is_some());
}

#[tokio::test]
async fn test_numeric_answer_yields_image_and_narrative() {
    let agent = Arc::new(ScriptedAgent::answering("North had 120 sales and South had 80."));
    let llm = Arc::new(ScriptedLlm::replying(&[
        BAR_CODE,
        "Title:\nSales by region\n\nTrend Observed:\nNorth leads.",
    ]));

    let artifact = pipeline(agent.clone(), llm.clone()).run("Sales by region?").await;

    assert_both_or_neither(&artifact);
    assert_eq!(
        artifact.narrative(),
        Some("Title:\nSales by region\n\nTrend Observed:\nNorth leads.")
    );
    let png = base64::engine::general_purpose::STANDARD
        .decode(artifact.image().unwrap())
        .unwrap();
    assert_eq!(&png[..8], &PNG_MAGIC);

    assert_eq!(agent.calls(), 1);
    assert_eq!(llm.calls(), 2);
    assert!(llm.prompts()[0].contains("North had 120 sales and South had 80."));
}

#[tokio::test]
async fn test_no_numeric_relationship_yields_nothing() {
    let agent = Arc::new(ScriptedAgent::answering("The policy was updated in March."));
    let llm = Arc::new(ScriptedLlm::replying(&[
        "No meaningful numeric relationship detected.",
    ]));

    let artifact = pipeline(agent, llm.clone()).run("When was the policy updated?").await;

    assert!(artifact.is_empty());
    assert_both_or_neither(&artifact);
    // The explainer never runs without an image.
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_agent_failure_yields_nothing() {
    let agent = Arc::new(ScriptedAgent::failing("no such table: sales"));
    let llm = Arc::new(ScriptedLlm::replying(&[]));

    let artifact = pipeline(agent, llm.clone()).run("Sales by region?").await;

    assert_eq!(artifact, ChartArtifact::empty());
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_rejected_code_yields_nothing() {
    let agent = Arc::new(ScriptedAgent::answering("North had 120."));
    let llm = Arc::new(ScriptedLlm::replying(&[
        "```python\nimport os\nos.system('rm -rf /')\n```",
        "should not be used",
    ]));

    let artifact = pipeline(agent, llm.clone()).run("Sales by region?").await;

    assert!(artifact.is_empty());
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_generator_failure_yields_nothing() {
    let agent = Arc::new(ScriptedAgent::answering("North had 120."));
    let llm = Arc::new(ScriptedLlm::new(vec![Err("rate limited")]));

    let artifact = pipeline(agent, llm).run("Sales by region?").await;
    assert!(artifact.is_empty());
}

#[tokio::test]
async fn test_explainer_failure_keeps_image() {
    let agent = Arc::new(ScriptedAgent::answering("North had 120 sales and South had 80."));
    let llm = Arc::new(ScriptedLlm::new(vec![Ok(BAR_CODE), Err("timeout")]));

    let artifact = pipeline(agent, llm).run("Sales by region?").await;

    assert_both_or_neither(&artifact);
    assert!(artifact.image().is_some());
    assert_eq!(
        artifact.narrative(),
        Some("Error generating response: LLM error: timeout")
    );
}
