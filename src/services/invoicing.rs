use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use tracing::instrument;

use crate::entities::{order, order_item};
use crate::errors::ServiceError;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;
const LINE_HEIGHT_MM: f32 = 7.0;
// Last line of items before a page break.
const BOTTOM_LIMIT_MM: f32 = 25.0;

/// Renders order invoices as single- or multi-page A4 PDFs using the
/// built-in Helvetica faces, so no font files ship with the binary.
pub struct InvoiceRenderer;

impl InvoiceRenderer {
    #[instrument(skip(order, items), fields(order_id = %order.id, items = items.len()))]
    pub fn render_pdf(
        order: &order::Model,
        items: &[order_item::Model],
    ) -> Result<Vec<u8>, ServiceError> {
        let (doc, page, layer) = PdfDocument::new(
            format!("Invoice {}", order.id),
            Mm(PAGE_WIDTH_MM),
            Mm(PAGE_HEIGHT_MM),
            "invoice",
        );
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(pdf_error)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(pdf_error)?;

        let mut layer = doc.get_page(page).get_layer(layer);
        let mut y = PAGE_HEIGHT_MM - MARGIN_MM;

        layer.use_text("INVOICE", 20.0, Mm(MARGIN_MM), Mm(y), &bold);
        y -= LINE_HEIGHT_MM * 2.0;

        layer.use_text(
            format!("Order: {}", order.id),
            10.0,
            Mm(MARGIN_MM),
            Mm(y),
            &regular,
        );
        y -= LINE_HEIGHT_MM;
        layer.use_text(
            format!("Date: {}", order.created_at.format("%Y-%m-%d")),
            10.0,
            Mm(MARGIN_MM),
            Mm(y),
            &regular,
        );
        y -= LINE_HEIGHT_MM;
        layer.use_text(
            format!("Billed to: {}", order.email),
            10.0,
            Mm(MARGIN_MM),
            Mm(y),
            &regular,
        );
        y -= LINE_HEIGHT_MM;
        layer.use_text(
            format!("Status: {}", order.status),
            10.0,
            Mm(MARGIN_MM),
            Mm(y),
            &regular,
        );
        if let Some(address) = &order.shipping_address {
            y -= LINE_HEIGHT_MM;
            layer.use_text(
                format!("Ship to: {address}"),
                10.0,
                Mm(MARGIN_MM),
                Mm(y),
                &regular,
            );
        }
        if let Some(reference) = &order.stripe_payment_intent_id {
            y -= LINE_HEIGHT_MM;
            layer.use_text(
                format!("Payment reference: {reference}"),
                10.0,
                Mm(MARGIN_MM),
                Mm(y),
                &regular,
            );
        }
        y -= LINE_HEIGHT_MM * 2.0;

        item_header(&layer, &bold, y);
        y -= LINE_HEIGHT_MM;

        for item in items {
            if y < BOTTOM_LIMIT_MM {
                let (next_page, next_layer) =
                    doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "invoice");
                layer = doc.get_page(next_page).get_layer(next_layer);
                y = PAGE_HEIGHT_MM - MARGIN_MM;
                item_header(&layer, &bold, y);
                y -= LINE_HEIGHT_MM;
            }

            layer.use_text(&item.name, 10.0, Mm(MARGIN_MM), Mm(y), &regular);
            layer.use_text(item.qty.to_string(), 10.0, Mm(110.0), Mm(y), &regular);
            layer.use_text(
                format!("{} {}", item.unit_price, order.currency),
                10.0,
                Mm(130.0),
                Mm(y),
                &regular,
            );
            layer.use_text(
                format!("{} {}", item.line_total, order.currency),
                10.0,
                Mm(165.0),
                Mm(y),
                &regular,
            );
            y -= LINE_HEIGHT_MM;
        }

        y -= LINE_HEIGHT_MM;
        for (label, value) in [
            ("Subtotal", order.subtotal),
            ("Tax", order.tax),
            ("Shipping", order.shipping),
        ] {
            layer.use_text(label, 10.0, Mm(130.0), Mm(y), &regular);
            layer.use_text(
                format!("{} {}", value, order.currency),
                10.0,
                Mm(165.0),
                Mm(y),
                &regular,
            );
            y -= LINE_HEIGHT_MM;
        }
        layer.use_text("Total", 12.0, Mm(130.0), Mm(y), &bold);
        layer.use_text(
            format!("{} {}", order.total, order.currency),
            12.0,
            Mm(165.0),
            Mm(y),
            &bold,
        );

        doc.save_to_bytes().map_err(pdf_error)
    }
}

fn item_header(layer: &PdfLayerReference, bold: &IndirectFontRef, y: f32) {
    layer.use_text("Item", 10.0, Mm(MARGIN_MM), Mm(y), bold);
    layer.use_text("Qty", 10.0, Mm(110.0), Mm(y), bold);
    layer.use_text("Unit price", 10.0, Mm(130.0), Mm(y), bold);
    layer.use_text("Line total", 10.0, Mm(165.0), Mm(y), bold);
}

fn pdf_error(e: printpdf::Error) -> ServiceError {
    ServiceError::InternalError(format!("pdf render: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn order_with_items(count: usize) -> (order::Model, Vec<order_item::Model>) {
        let order_id = Uuid::new_v4();
        let order = order::Model {
            id: order_id,
            email: "buyer@example.com".into(),
            status: "paid".into(),
            subtotal: dec!(25),
            tax: dec!(0),
            shipping: dec!(0),
            total: dec!(25),
            currency: "USD".into(),
            stripe_session_id: None,
            stripe_payment_intent_id: None,
            shipping_address: Some("1 Main St, Springfield".into()),
            shipping_method: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        let items = (0..count)
            .map(|i| order_item::Model {
                id: Uuid::new_v4(),
                order_id,
                product_id: Uuid::new_v4(),
                name: format!("Widget {i}"),
                unit_price: dec!(12.50),
                qty: 2,
                line_total: dec!(25),
                created_at: Utc::now(),
            })
            .collect();
        (order, items)
    }

    #[test]
    fn renders_a_pdf_document() {
        let (order, items) = order_with_items(2);
        let bytes = InvoiceRenderer::render_pdf(&order, &items).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn long_item_lists_paginate() {
        let (order, items) = order_with_items(80);
        let bytes = InvoiceRenderer::render_pdf(&order, &items).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        // More than one /Page object in the output.
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.matches("/Type /Page").count() > 1 || bytes.len() > 4_000);
    }
}
