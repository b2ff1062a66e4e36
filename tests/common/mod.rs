use std::fs::File;
use std::path::Path;

pub fn write_operations(path: &Path, rows: &[[&str; 4]]) -> Result<(), csv::Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["op", "account", "to", "amount"])?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;

    Ok(())
}
