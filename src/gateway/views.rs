// SPDX-License-Identifier: EUPL-1.2
// Copyright (c) 2026 Benjamin Küttner <benjamin.kuettner@icloud.com>

//! Server-rendered pages.

use anyhow::{Context, Result};
use axum::response::Html;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use qrcode::render::svg;
use qrcode::QrCode;

use crate::fhir::MedicationRequest;
use crate::util::escape_html;

/// Render `text` as a QR code, returned as an SVG `data:` URL.
pub fn qr_data_url(text: &str) -> Result<String> {
    let code = QrCode::new(text.as_bytes()).context("Text does not fit into a QR code")?;
    let image = code
        .render::<svg::Color<'_>>()
        .min_dimensions(256, 256)
        .quiet_zone(true)
        .build();
    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<link rel="stylesheet" href="/styles/main.css">
</head>
<body>
<main>
{body}
</main>
</body>
</html>
"#,
        title = escape_html(title),
    ))
}

fn link(href: &str, label: &str) -> String {
    format!(
        r#"<a class="button" href="{}">{}</a>"#,
        escape_html(href),
        escape_html(label)
    )
}

/// QR image plus a download link, or a notice when no image is available.
fn qr_block(data_url: Option<&str>) -> String {
    match data_url {
        Some(data) => format!(
            r#"<figure id="qrcode"><img src="{data}" alt="QR code"></figure>
<a id="download" href="{data}" download="qrcode.svg">Download QR code</a>"#,
            data = escape_html(data)
        ),
        None => r#"<p class="notice">The QR code could not be generated. Use the link below instead.</p>"#
            .to_owned(),
    }
}

pub fn index(smart_launch_path: &str, verifier_path: &str) -> Html<String> {
    page(
        "Hospital",
        &format!(
            "<h1>Hospital</h1>\n<nav>\n{}\n{}\n</nav>",
            link(smart_launch_path, "Issue prescriptions (SMART launch)"),
            link(verifier_path, "Verify prescriptions")
        ),
    )
}

pub fn session_expired() -> Html<String> {
    page(
        "Session expired",
        &format!(
            "<h1>Session expired</h1>\n<p>Your SMART session has expired. Please launch the app again.</p>\n{}",
            link("/", "Back to portal")
        ),
    )
}

pub fn issuer_landing(prescriptions_path: &str) -> Html<String> {
    page(
        "Hospital issuer",
        &format!(
            "<h1>Hospital issuer</h1>\n{}",
            link(prescriptions_path, "Show prescriptions")
        ),
    )
}

pub fn prescriptions(
    requests: &[MedicationRequest],
    issuer_path: &str,
    prescriptions_path: &str,
) -> Html<String> {
    let mut rows = String::new();
    for request in requests {
        let Some(id) = request.id.as_deref() else {
            continue;
        };
        let offer_path = format!("{prescriptions_path}/{id}/offer");
        rows.push_str(&format!(
            r#"<tr>
<td>{name}</td>
<td>{authored}</td>
<td>{status}</td>
<td><form action="{action}" method="get">
<input type="number" name="validityDays" min="1" value="1" aria-label="Validity in days">
<button type="submit">Create offer</button>
</form></td>
</tr>
"#,
            name = escape_html(request.medication_name().unwrap_or("Unknown medication")),
            authored = escape_html(request.authored_on.as_deref().unwrap_or("")),
            status = escape_html(request.status.as_deref().unwrap_or("")),
            action = escape_html(&offer_path),
        ));
    }
    let table = if rows.is_empty() {
        "<p>No prescriptions found.</p>".to_owned()
    } else {
        format!(
            "<table>\n<thead><tr><th>Medication</th><th>Authored on</th><th>Status</th><th>Validity (days)</th></tr></thead>\n<tbody>\n{rows}</tbody>\n</table>"
        )
    };
    page(
        "Prescriptions",
        &format!("<h1>Prescriptions</h1>\n{table}\n{}", link(issuer_path, "Back")),
    )
}

pub fn offer(offer: &str, qr: Option<&str>, prescriptions_path: &str) -> Html<String> {
    page(
        "Prescription offer",
        &format!(
            r#"<h1>Prescription offer</h1>
<p>Scan the QR code with your wallet to receive the prescription.</p>
{qr}
<p><a id="offer" href="{offer}">{offer_text}</a></p>
{back}"#,
            qr = qr_block(qr),
            offer = escape_html(offer),
            offer_text = escape_html(offer),
            back = link(prescriptions_path, "Back to prescriptions"),
        ),
    )
}

pub fn verifier_landing(verify_path: &str) -> Html<String> {
    page(
        "Hospital verifier",
        &format!(
            "<h1>Hospital verifier</h1>\n{}",
            link(verify_path, "Verify a prescription")
        ),
    )
}

pub fn verification(
    request: &str,
    qr: Option<&str>,
    verifier_path: &str,
    events_endpoint: &str,
) -> Html<String> {
    page(
        "Prescription verification",
        &format!(
            r#"<h1>Prescription verification</h1>
<p>Scan the QR code with your wallet to present a prescription.</p>
{qr}
<p><a id="request" href="{request}">{request_text}</a></p>
<section id="status" data-events="{events}">
<h2>Status</h2>
<ul id="events"></ul>
<pre id="result" hidden></pre>
</section>
{back}
<script src="/scripts/verification.js"></script>"#,
            qr = qr_block(qr),
            request = escape_html(request),
            request_text = escape_html(request),
            events = escape_html(events_endpoint),
            back = link(verifier_path, "Back"),
        ),
    )
}
