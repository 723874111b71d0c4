//! Cart commands: show, add, update, remove, clear, validate.

use cartsync_core::{CartSnapshot, CartSource, LineId, ProductId, VariantSelection};

use cartsync::{AddItem, CleanupReport};

use super::{Cart, CliError};

/// Parse a `name=value` variant option.
pub fn parse_option(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_owned(), value.trim().to_owned()))
        }
        _ => Err(format!("expected name=value, got `{raw}`")),
    }
}

/// Build the variant selection for `add`; `None` when nothing was chosen.
fn selection(variant: Option<String>, options: Vec<(String, String)>) -> Option<VariantSelection> {
    let mut selection = VariantSelection {
        variant_id: variant.map(Into::into),
        ..VariantSelection::default()
    };
    for (name, value) in options {
        selection = selection.with_option(name, value);
    }
    (!selection.is_blank()).then_some(selection)
}

pub async fn show(cart: &mut Cart, json: bool) -> Result<(), CliError> {
    let snapshot = cart.refresh().await?;
    print_snapshot(&snapshot, json)
}

pub async fn add(
    cart: &mut Cart,
    product_id: &str,
    quantity: u32,
    variant: Option<String>,
    options: Vec<(String, String)>,
    json: bool,
) -> Result<(), CliError> {
    let mut item = AddItem::new(ProductId::from(product_id), quantity);
    item.variant = selection(variant, options);
    let snapshot = cart.add(item).await?;
    print_snapshot(&snapshot, json)
}

pub async fn update(
    cart: &mut Cart,
    line_id: &str,
    quantity: i64,
    json: bool,
) -> Result<(), CliError> {
    cart.refresh().await?;
    let snapshot = cart.update(&LineId::from(line_id), quantity).await?;
    print_snapshot(&snapshot, json)
}

pub async fn remove(cart: &mut Cart, line_ids: &[String], json: bool) -> Result<(), CliError> {
    cart.refresh().await?;
    let ids: Vec<LineId> = line_ids.iter().map(|id| LineId::from(id.as_str())).collect();
    let snapshot = match ids.as_slice() {
        [id] => cart.remove(id).await?,
        _ => cart.remove_many(&ids).await?,
    };
    print_snapshot(&snapshot, json)
}

pub async fn clear(cart: &mut Cart, json: bool) -> Result<(), CliError> {
    let snapshot = cart.clear().await?;
    print_snapshot(&snapshot, json)
}

pub async fn validate(cart: &mut Cart, json: bool) -> Result<(), CliError> {
    if !cart.auth_state().is_authenticated() {
        tracing::info!("Guest carts are not validated; nothing to do");
    }
    let report = cart.cleanup_invalid().await?;
    print_cleanup(&report, json)?;
    if report.is_success() {
        Ok(())
    } else {
        Err(CliError::CleanupIncomplete(report.failed.len()))
    }
}

#[allow(clippy::print_stdout)]
pub fn print_snapshot(snapshot: &CartSnapshot, json: bool) -> Result<(), CliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    let label = match snapshot.source {
        CartSource::Guest => "guest cart",
        CartSource::Authoritative => "cart",
    };
    if snapshot.is_empty() {
        println!("Your {label} is empty");
        return Ok(());
    }

    println!("{label} ({} items)", snapshot.item_count);
    for line in &snapshot.items {
        let name = line
            .product
            .as_ref()
            .map_or_else(|| line.product_id.to_string(), |p| p.name.clone());
        let variant = line
            .variant_id()
            .map(|id| format!(" [{id}]"))
            .unwrap_or_default();
        let price = line
            .line_price()
            .map(|price| format!("  {price}"))
            .unwrap_or_default();
        println!("  {:<24} {name}{variant} x{}{price}", line.id.as_str(), line.quantity);
    }
    if let Some(subtotal) = &snapshot.subtotal {
        println!("Subtotal: {subtotal}");
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_cleanup(report: &CleanupReport, json: bool) -> Result<(), CliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "Flagged {}, removed {}, failed {}",
        report.flagged,
        report.removed.len(),
        report.failed.len()
    );
    for (line_id, reason) in &report.failed {
        println!("  {line_id}: {reason}");
    }
    Ok(())
}
