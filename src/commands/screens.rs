//! List-screens command implementation.

use pmctop::ScreenCatalog;

/// Prints every screen with its index, description and columns.
pub fn command_list_screens(catalog: &ScreenCatalog, verbose: bool) -> anyhow::Result<()> {
    print!("{}", render_screen_list(catalog, verbose));
    Ok(())
}

fn render_screen_list(catalog: &ScreenCatalog, verbose: bool) -> String {
    if !verbose {
        return catalog.list_screens();
    }
    let mut out = String::from("Available screens:\n");
    for (i, screen) in catalog.iter().enumerate() {
        out.push_str(&format!("{:2}: {}", i, screen.name()));
        if let Some(desc) = screen.desc() {
            out.push_str(&format!(" - {}", desc));
        }
        out.push('\n');
        for column in screen.columns() {
            out.push_str(&format!("      {:<10}", column.header.trim()));
            match &column.desc {
                Some(desc) => out.push_str(&format!(" {}\n", desc)),
                None => out.push_str(&format!(" {}\n", column.expr)),
            }
        }
    }
    out
}
