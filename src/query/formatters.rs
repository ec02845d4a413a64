use crate::repository::{AssetTransfer, HistoricDataProgress, TransferStats};
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

fn csv_output(wtr: Writer<Vec<u8>>) -> String {
    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

fn optional_address(address: Option<alloy_primitives::Address>) -> String {
    address.map_or("-".to_string(), |a| format!("{a:#x}"))
}

pub fn format_transfers(transfers: &[AssetTransfer], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_transfers_table(transfers),
        // Same document shape the pipeline stores
        OutputFormat::Json => {
            serde_json::to_string_pretty(transfers).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => format_transfers_csv(transfers),
    }
}

fn format_transfers_table(transfers: &[AssetTransfer]) -> String {
    if transfers.is_empty() {
        return "No transfers found.".to_string();
    }

    let mut table = new_table(vec![
        "Block", "Category", "From", "To", "Token", "Value", "Gas Price (gwei)", "Tx Hash",
    ]);

    for transfer in transfers {
        table.add_row(vec![
            Cell::new(transfer.block_num),
            Cell::new(transfer.category),
            Cell::new(format!("{:#x}", transfer.from)),
            Cell::new(optional_address(transfer.to)),
            Cell::new(optional_address(transfer.token_address)),
            Cell::new(transfer.value),
            Cell::new(transfer.gas_price),
            Cell::new(format_tx_hash(&format!("{:#x}", transfer.hash))),
        ]);
    }

    table.to_string()
}

fn format_transfers_csv(transfers: &[AssetTransfer]) -> String {
    let mut wtr = Writer::from_writer(vec![]);

    let _ = wtr.write_record([
        "unique_id",
        "category",
        "block_number",
        "transaction_hash",
        "from",
        "to",
        "token_address",
        "value",
        "gas",
        "gas_price",
        "gas_used",
        "timestamp",
    ]);

    for transfer in transfers {
        let _ = wtr.write_record([
            transfer.unique_id.clone(),
            transfer.category.to_string(),
            transfer.block_num.to_string(),
            format!("{:#x}", transfer.hash),
            format!("{:#x}", transfer.from),
            transfer.to.map(|a| format!("{a:#x}")).unwrap_or_default(),
            transfer.token_address.map(|a| format!("{a:#x}")).unwrap_or_default(),
            transfer.value.to_string(),
            transfer.gas.to_string(),
            transfer.gas_price.to_string(),
            transfer.gas_used.map(|g| g.to_string()).unwrap_or_default(),
            transfer.timestamp.to_string(),
        ]);
    }

    csv_output(wtr)
}

pub fn format_progress(progress: Option<&HistoricDataProgress>, format: &OutputFormat) -> String {
    let Some(progress) = progress else {
        return match format {
            OutputFormat::Json => "null".to_string(),
            _ => "No historic data job recorded.".to_string(),
        };
    };

    let done = progress.last_fetched_block >= progress.end_block;
    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Type", "Start", "End", "Last Fetched", "Done"]);
            table.add_row(vec![
                Cell::new(progress.data_type),
                Cell::new(progress.start_block),
                Cell::new(progress.end_block),
                Cell::new(progress.last_fetched_block),
                Cell::new(if done { "yes" } else { "no" }),
            ]);
            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "type": progress.data_type,
            "startBlock": progress.start_block,
            "endBlock": progress.end_block,
            "lastFetchedBlock": progress.last_fetched_block,
            "done": done,
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record([
                "type",
                "start_block",
                "end_block",
                "last_fetched_block",
                "done",
            ]);
            let _ = wtr.write_record([
                progress.data_type.to_string(),
                progress.start_block.to_string(),
                progress.end_block.to_string(),
                progress.last_fetched_block.to_string(),
                done.to_string(),
            ]);
            csv_output(wtr)
        }
    }
}

pub fn format_cursor(last_synced_block: Option<u64>, format: &OutputFormat) -> String {
    let value = last_synced_block.map_or("N/A".to_string(), |b| b.to_string());
    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Metric", "Value"]);
            table.add_row(vec![Cell::new("Last Synced Block"), Cell::new(value)]);
            table.to_string()
        }
        OutputFormat::Json => json!({ "last_synced_block": last_synced_block }).to_string(),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["metric", "value"]);
            let _ = wtr.write_record(["last_synced_block", &value]);
            csv_output(wtr)
        }
    }
}

pub fn format_stats(stats: &TransferStats, format: &OutputFormat) -> String {
    let earliest = stats.earliest_block.map_or("N/A".to_string(), |b| b.to_string());
    let latest = stats.latest_block.map_or("N/A".to_string(), |b| b.to_string());

    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Metric", "Value"]);

            table.add_row(vec![
                Cell::new("Total Transfers"),
                Cell::new(stats.total_transfers),
            ]);
            for (category, count) in &stats.by_category {
                table.add_row(vec![
                    Cell::new(format!("{category} transfers")),
                    Cell::new(count),
                ]);
            }
            table.add_row(vec![Cell::new("Earliest Block"), Cell::new(&earliest)]);
            table.add_row(vec![Cell::new("Latest Block"), Cell::new(&latest)]);

            table.to_string()
        }
        OutputFormat::Json => {
            let by_category: serde_json::Map<String, serde_json::Value> = stats
                .by_category
                .iter()
                .map(|(category, count)| (category.clone(), json!(count)))
                .collect();
            serde_json::to_string_pretty(&json!({
                "total_transfers": stats.total_transfers,
                "by_category": by_category,
                "earliest_block": stats.earliest_block,
                "latest_block": stats.latest_block,
            }))
            .unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["metric", "value"]);
            let _ = wtr.write_record(["total_transfers", &stats.total_transfers.to_string()]);
            for (category, count) in &stats.by_category {
                let _ = wtr.write_record([format!("{category}_transfers"), count.to_string()]);
            }
            let _ = wtr.write_record(["earliest_block", &earliest]);
            let _ = wtr.write_record(["latest_block", &latest]);
            csv_output(wtr)
        }
    }
}

fn format_tx_hash(hash: &str) -> String {
    if hash.len() <= 10 {
        return hash.to_string();
    }
    format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{DataType, TransferCategory};
    use alloy_primitives::{Address, B256};

    fn transfer() -> AssetTransfer {
        AssetTransfer {
            category: TransferCategory::Token,
            token_address: Some(Address::repeat_byte(0xee)),
            from: Address::repeat_byte(0x11),
            to: Some(Address::repeat_byte(0x22)),
            value: 1.5,
            hash: B256::repeat_byte(0xab),
            block_num: 12,
            unique_id: "0xab:log:3".to_string(),
            gas: 21000,
            gas_price: 1.0,
            gas_used: None,
            timestamp: 1_615_246_920_000,
        }
    }

    #[test]
    fn csv_has_one_row_per_transfer() {
        let output = format_transfers(&[transfer()], &OutputFormat::Csv);
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("unique_id,category,block_number"));
        assert!(lines[1].starts_with("0xab:log:3,token,12,"));
    }

    #[test]
    fn json_keeps_the_stored_document_shape() {
        let output = format_transfers(&[transfer()], &OutputFormat::Json);
        let parsed: Vec<AssetTransfer> = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed, vec![transfer()]);
    }

    #[test]
    fn empty_table_says_so() {
        assert_eq!(
            format_transfers(&[], &OutputFormat::Table),
            "No transfers found."
        );
    }

    #[test]
    fn progress_reports_completion() {
        let progress = HistoricDataProgress {
            start_block: 5,
            end_block: 11,
            last_fetched_block: 12,
            data_type: DataType::AssetTransfer,
        };
        let output = format_progress(Some(&progress), &OutputFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed["done"], true);
        assert_eq!(parsed["type"], "AssetTransfer");
        assert_eq!(format_progress(None, &OutputFormat::Json), "null");
    }

    #[test]
    fn shortens_transaction_hashes() {
        assert_eq!(format_tx_hash("0x1234567890abcdef"), "0x1234...cdef");
        assert_eq!(format_tx_hash("0x12"), "0x12");
    }
}
