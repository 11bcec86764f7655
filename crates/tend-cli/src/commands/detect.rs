//! Distortion check and template listing

use anyhow::Result;
use chrono::Utc;
use tend_core::distortion::{DetectionContext, DistortionDetector};
use tend_core::TemplateEngine;

pub fn cmd_detect(text: &str) -> Result<()> {
    let detector = DistortionDetector::new();
    let assessment = detector.assess(text, &DetectionContext::new(Utc::now()))?;

    println!("🔍 {}", assessment.rationale);
    if assessment.is_empty() {
        return Ok(());
    }

    println!("   Severity: {}", assessment.severity.as_str());
    println!("   Confidence: {:.2}", assessment.confidence);
    for kind in &assessment.detected {
        println!("   - {} ({})", kind.label(), kind.as_str());
    }
    if !assessment.recommended.is_empty() {
        let techniques: Vec<&str> = assessment.recommended.iter().map(|t| t.label()).collect();
        println!("   Try: {}", techniques.join(", "));
    }
    if let Some(intervention) = &assessment.intervention {
        println!();
        println!("   🛟 {}", intervention.title);
        println!("      {}", intervention.message);
        for step in &intervention.advice {
            println!("      - {}", step);
        }
    }
    Ok(())
}

pub fn cmd_templates() -> Result<()> {
    let engine = TemplateEngine::new();

    println!("📋 Insight templates ({})", engine.len());
    println!("   {:<30} {:<12} PRIORITY", "ID", "CATEGORY");
    for (id, category, priority) in engine.describe() {
        println!("   {:<30} {:<12} {}", id, category.as_str(), priority.as_str());
    }
    Ok(())
}
