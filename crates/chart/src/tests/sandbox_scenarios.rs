//! Rendering generated text end to end.

use crate::sandbox::{ChartKind, RenderOutcome, SandboxRenderer};
use base64::Engine;
use ragchart_core::{AppError, ChartSettings};

fn renderer() -> SandboxRenderer {
    SandboxRenderer::new(&ChartSettings {
        dpi: 20,
        ..ChartSettings::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_minimal_bar_renders_png() {
    let text = "```python\nlabels=[\"A\",\"B\"]; values=[1,2]\nplt.bar(labels, values)\n```";
    let outcome = renderer().render(text).await.unwrap();

    let RenderOutcome::Rendered { spec, image_base64 } = outcome else {
        panic!("expected a rendered chart");
    };
    assert_eq!(spec.kinds(), vec![ChartKind::Bar]);
    assert_eq!(spec.panels[0].series[0].labels, vec!["A", "B"]);

    let png = base64::engine::general_purpose::STANDARD
        .decode(image_base64)
        .unwrap();
    assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
}

#[tokio::test]
async fn test_prose_is_no_code() {
    let outcome = renderer()
        .render("No meaningful numeric relationship detected.")
        .await
        .unwrap();
    assert_eq!(outcome, RenderOutcome::NoCode);
    assert_eq!(outcome.image(), None);
}

#[tokio::test]
async fn test_seaborn_subplots_render() {
    let text = r#"```python
import matplotlib.pyplot as plt
import seaborn as sns

data = {"region": ["North", "South", "East"], "sales": [120, 80, 42]}
fig, axes = plt.subplots(1, 2, figsize=(10, 4))
sns.barplot(x="region", y="sales", data=data, ax=axes[0])
axes[0].set_title("Sales")
axes[1].pie(data["sales"], labels=data["region"], autopct="%1.1f%%")
fig.suptitle("Regional sales")
plt.tight_layout()
plt.show()
```"#;
    let outcome = renderer().render(text).await.unwrap();

    let RenderOutcome::Rendered { spec, .. } = outcome else {
        panic!("expected a rendered chart");
    };
    assert_eq!(spec.cols, 2);
    assert_eq!(spec.kinds(), vec![ChartKind::Bar, ChartKind::Pie]);
    assert_eq!(spec.title.as_deref(), Some("Regional sales"));
}

#[tokio::test]
async fn test_escapes_are_rejected() {
    for code in [
        "import subprocess\nsubprocess.run(['ls'])",
        "open('/etc/passwd').read()",
        "plt.bar(['A'], [1])\nplt.savefig('/tmp/out.png')",
        "x = ().__class__",
        "def f():\n    pass",
        "exec('print(1)')",
    ] {
        let text = format!("```python\n{}\n```", code);
        assert!(
            matches!(renderer().render(&text).await, Err(AppError::Sandbox(_))),
            "expected rejection for {:?}",
            code
        );
    }
}

#[tokio::test]
async fn test_resource_exhaustion_is_rejected_before_timeout() {
    let doubling = format!("a = [1]\n{}plt.bar(['x'], [1])", "a = [a, a]\n".repeat(34));
    let deep_parens = format!("x = {}1{}", "(".repeat(5000), ")".repeat(5000));
    let negations = format!("x = {}1", "-".repeat(5000));

    for code in [doubling, deep_parens, negations] {
        let text = format!("```python\n{}\n```", code);
        assert!(text.len() < ChartSettings::default().max_code_bytes);

        let err = renderer().render(&text).await.unwrap_err();
        assert!(matches!(err, AppError::Sandbox(_)));
        assert!(!err.to_string().contains("exceeded"), "{}", err);
    }
}
