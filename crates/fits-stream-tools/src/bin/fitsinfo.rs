use std::fs::File;
use std::io::BufReader;
use std::process;

use fits_stream::hdu::{DataUnit, Document, Hdu};
use fits_stream::header::Card;

fn ext_label(hdu: &Hdu<BufReader<File>>) -> String {
    match hdu.name() {
        Some(name) => format!(" (EXTNAME: {})", name),
        None => String::new(),
    }
}

fn format_hdu(index: usize, hdu: &Hdu<BufReader<File>>) -> String {
    let mut out = String::new();
    match &hdu.data {
        None | Some(DataUnit::Image(_)) => {
            let kind = if hdu.header.is_primary() {
                "Primary".to_string()
            } else {
                format!("IMAGE extension{}", ext_label(hdu))
            };
            out.push_str(&format!("HDU {}: {}\n", index, kind));
            if let Some(bitpix) = hdu.header.get_int("BITPIX") {
                out.push_str(&format!("  BITPIX: {}\n", bitpix));
            }
            if let Ok(naxes) = hdu.header.naxes() {
                out.push_str(&format!("  NAXIS: {}\n", naxes.len()));
                if !naxes.is_empty() {
                    out.push_str(&format!("  Dimensions: {:?}\n", naxes));
                }
            }
            out.push_str(&format!("  Data size: {} bytes\n", hdu.data_len));
        }
        Some(DataUnit::AsciiTable(table)) => {
            out.push_str(&format!("HDU {}: TABLE extension{}\n", index, ext_label(hdu)));
            out.push_str(&format!("  Columns: {}\n", table.columns().len()));
            out.push_str(&format!("  Rows: {}\n", table.num_rows()));
            out.push_str(&format!("  Data size: {} bytes\n", hdu.data_len));
        }
        Some(DataUnit::BinaryTable(table)) => {
            out.push_str(&format!(
                "HDU {}: BINTABLE extension{}\n",
                index,
                ext_label(hdu)
            ));
            out.push_str(&format!("  Columns: {}\n", table.columns().len()));
            out.push_str(&format!("  Rows: {}\n", table.num_rows()));
            out.push_str(&format!("  Data size: {} bytes\n", hdu.data_len));
            if let Some(pcount) = hdu.header.get_int("PCOUNT") {
                if pcount > 0 {
                    out.push_str(&format!("  Heap size: {} bytes\n", pcount));
                }
            }
        }
        Some(DataUnit::CompressedImage(image)) => {
            out.push_str(&format!(
                "HDU {}: Compressed IMAGE{}\n",
                index,
                ext_label(hdu)
            ));
            out.push_str(&format!("  ZBITPIX: {}\n", image.zbitpix()));
            out.push_str(&format!("  Dimensions: {:?}\n", image.dimensions()));
            out.push_str(&format!("  Tiles: {}\n", image.num_tiles()));
            out.push_str(&format!("  Data size: {} bytes\n", hdu.data_len));
        }
    }
    out
}

fn format_verbose_cards(cards: &[Card]) -> String {
    let mut out = String::new();
    out.push_str("  Header cards:\n");
    for card in cards {
        if card.is_end() {
            continue;
        }
        let kw = card.keyword_str();
        match (&card.value, &card.comment) {
            (Some(val), Some(comment)) => {
                out.push_str(&format!("    {} = {:?} / {}\n", kw, val, comment));
            }
            (Some(val), None) => {
                out.push_str(&format!("    {} = {:?}\n", kw, val));
            }
            (None, Some(comment)) => {
                out.push_str(&format!("    {} {}\n", kw, comment));
            }
            (None, None) => {
                if !card.is_blank() {
                    out.push_str(&format!("    {}\n", kw));
                }
            }
        }
    }
    out
}

fn format_document(doc: &Document<BufReader<File>>, verbose: bool) -> String {
    let mut out = String::new();
    for (i, hdu) in doc.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format_hdu(i, hdu));
        if verbose {
            out.push_str(&format_verbose_cards(hdu.header.cards()));
        }
    }
    for warning in &doc.warnings {
        out.push_str(&format!(
            "Warning: {} (card {}): {}\n",
            warning.keyword, warning.card_index, warning.message
        ));
    }
    if let Some(terminal) = &doc.terminal {
        out.push_str(&format!("Parsing stopped early: {}\n", terminal));
    }
    out
}

fn run(args: &[String]) -> Result<String, String> {
    let mut verbose = false;
    let mut file_path = None;

    for arg in args {
        if arg == "-v" || arg == "--verbose" {
            verbose = true;
        } else if arg.starts_with('-') {
            return Err(format!("Unknown option: {}", arg));
        } else {
            if file_path.is_some() {
                return Err("Too many arguments".to_string());
            }
            file_path = Some(arg.as_str());
        }
    }

    let path = file_path.ok_or_else(|| {
        "Usage: fitsinfo [-v] <file.fits>\n\nPrint HDU summary for a FITS file.".to_string()
    })?;

    let file = File::open(path).map_err(|e| format!("Error reading '{}': {}", path, e))?;
    let doc = fits_stream::parse(BufReader::new(file))
        .map_err(|e| format!("Error parsing '{}': {}", path, e))?;

    Ok(format_document(&doc, verbose))
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(output) => print!("{}", output),
        Err(msg) => {
            eprintln!("{}", msg);
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fits_stream::{BLOCK_SIZE, CARD_SIZE};
    use std::io::Write;

    fn header_block(cards: &[&str]) -> Vec<u8> {
        let mut block = vec![b' '; BLOCK_SIZE];
        let mut all = cards.to_vec();
        all.push("END");
        for (i, line) in all.iter().enumerate() {
            block[i * CARD_SIZE..i * CARD_SIZE + line.len()].copy_from_slice(line.as_bytes());
        }
        block
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn summarizes_a_primary_hdu() {
        let mut buf = header_block(&[
            "SIMPLE  =                    T",
            "BITPIX  =                   16",
            "NAXIS   =                    2",
            "NAXIS1  =                    2",
            "NAXIS2  =                    2",
        ]);
        buf.resize(2 * BLOCK_SIZE, 0);
        let file = write_temp(&buf);

        let args = vec![file.path().to_str().unwrap().to_string()];
        let output = run(&args).unwrap();
        assert!(output.contains("HDU 0: Primary"));
        assert!(output.contains("BITPIX: 16"));
        assert!(output.contains("Dimensions: [2, 2]"));
        assert!(output.contains("Data size: 8 bytes"));
    }

    #[test]
    fn verbose_lists_header_cards() {
        let buf = header_block(&[
            "SIMPLE  =                    T",
            "BITPIX  =                    8",
            "NAXIS   =                    0",
        ]);
        let file = write_temp(&buf);

        let args = vec!["-v".to_string(), file.path().to_str().unwrap().to_string()];
        let output = run(&args).unwrap();
        assert!(output.contains("Header cards:"));
        assert!(output.contains("SIMPLE"));
    }

    #[test]
    fn run_missing_file() {
        let args = vec!["nonexistent.fits".to_string()];
        let result = run(&args);
        assert!(result.unwrap_err().contains("Error reading"));
    }

    #[test]
    fn run_no_args() {
        let result = run(&[]);
        assert!(result.unwrap_err().contains("Usage:"));
    }

    #[test]
    fn run_unknown_option() {
        let args = vec!["--foo".to_string()];
        assert!(run(&args).unwrap_err().contains("Unknown option"));
    }
}
