//! PDF generation tool
//!
//! Renders a PDF inside the sandbox with reportlab. The title and content
//! travel through a JSON payload file so no shell or Python quoting is
//! involved.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::traits::{required_str, Tool, ToolResult};
use crate::sandbox::WorkspaceContainer;
use crate::session::SharedContext;

const GENERATOR_SCRIPT: &str = r####"
import json
from reportlab.lib.pagesizes import letter
from reportlab.lib.styles import getSampleStyleSheet, ParagraphStyle
from reportlab.lib.units import inch
from reportlab.platypus import SimpleDocTemplate, Paragraph, Spacer
from reportlab.lib.enums import TA_CENTER

with open("_pdf_payload.json") as f:
    payload = json.load(f)

doc = SimpleDocTemplate(payload["file_path"], pagesize=letter,
                        rightMargin=72, leftMargin=72,
                        topMargin=72, bottomMargin=72)
styles = getSampleStyleSheet()
title_style = ParagraphStyle("DocTitle", parent=styles["Heading1"],
                             fontSize=24, spaceAfter=30, alignment=TA_CENTER)
heading_style = ParagraphStyle("DocHeading", parent=styles["Heading2"],
                               fontSize=16, spaceBefore=20, spaceAfter=10)
subheading_style = ParagraphStyle("DocSubheading", parent=styles["Heading3"],
                                  fontSize=14, spaceBefore=15, spaceAfter=8)
body_style = ParagraphStyle("DocBody", parent=styles["Normal"],
                            fontSize=11, spaceBefore=6, spaceAfter=6, leading=14)

story = [Paragraph(payload["title"], title_style), Spacer(1, 0.5 * inch)]
for line in payload["content"].split("\n"):
    line = line.strip()
    if not line:
        story.append(Spacer(1, 0.2 * inch))
    elif line.startswith("### "):
        story.append(Paragraph(line[4:], subheading_style))
    elif line.startswith("## "):
        story.append(Paragraph(line[3:], heading_style))
    elif line.startswith("# "):
        story.append(Paragraph(line[2:], heading_style))
    else:
        story.append(Paragraph(line, body_style))

doc.build(story)
print("PDF created successfully")
"####;

/// Built-in tool: create_pdf
pub struct CreatePdfTool {
    container: Arc<WorkspaceContainer>,
    context: SharedContext,
}

impl CreatePdfTool {
    pub fn new(container: Arc<WorkspaceContainer>, context: SharedContext) -> Self {
        CreatePdfTool { container, context }
    }
}

#[async_trait]
impl Tool for CreatePdfTool {
    fn name(&self) -> &str {
        "create_pdf"
    }

    fn description(&self) -> &str {
        "Create a PDF document from text content. Supports markdown-like headings: \
         # for titles, ## for subtitles, regular text for paragraphs."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Output PDF filename (e.g. 'article.pdf', 'report.pdf')"
                },
                "title": {
                    "type": "string",
                    "description": "Document title"
                },
                "content": {
                    "type": "string",
                    "description": "Text content for the PDF. Use # for headings, ## for subheadings."
                }
            },
            "required": ["file_path", "title", "content"]
        })
    }

    fn requires_sandbox(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let file_path = match required_str(&args, "file_path") {
            Ok(path) => path,
            Err(failure) => return failure,
        };
        let title = match required_str(&args, "title") {
            Ok(title) => title,
            Err(failure) => return failure,
        };
        let content = match required_str(&args, "content") {
            Ok(content) => content,
            Err(failure) => return failure,
        };

        let output_path = match self.container.resolve_path(file_path) {
            Ok(path) => path,
            Err(e) => return ToolResult::failure(format!("Error: {}", e)),
        };

        // Make sure reportlab is present; a quiet no-op when it is.
        let _ = self
            .container
            .execute("pip install reportlab -q", Duration::from_secs(120))
            .await;

        let payload = serde_json::json!({
            "file_path": file_path,
            "title": title,
            "content": content,
        });
        let workspace = self.container.workspace_dir();
        let payload_path = workspace.join("_pdf_payload.json");
        let script_path = workspace.join("_pdf_generator.py");

        let staged = std::fs::write(&payload_path, payload.to_string())
            .and_then(|_| std::fs::write(&script_path, GENERATOR_SCRIPT));
        if let Err(e) = staged {
            return ToolResult::failure(format!("Error creating PDF: {}", e));
        }

        let run = self
            .container
            .execute("python _pdf_generator.py", Duration::from_secs(120))
            .await;

        // Clean up staging files regardless of outcome.
        let _ = std::fs::remove_file(&payload_path);
        let _ = std::fs::remove_file(&script_path);

        let (stdout, stderr, exit_code) = match run {
            Ok(result) => result,
            Err(e) => return ToolResult::failure(format!("Error creating PDF: {}", e)),
        };
        if exit_code != 0 {
            let detail = if stderr.is_empty() { stdout } else { stderr };
            return ToolResult::failure(format!("Error creating PDF: {}", detail));
        }
        if !output_path.exists() {
            return ToolResult::failure("Error: PDF file was not created");
        }

        if let Ok(mut context) = self.context.lock() {
            context.register_file(file_path, true);
        }

        let size = output_path.metadata().map(|m| m.len()).unwrap_or(0);
        let session_id = self.container.session_id();
        debug!("PDF created: {} ({} bytes)", file_path, size);

        ToolResult::success(format!(
            "PDF created successfully: {}\nSize: {} bytes\nDownload URL: /files/{}/download?path={}",
            file_path, size, session_id, file_path
        ))
    }
}
