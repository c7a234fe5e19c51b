use anyhow::{Context, Result};
use clap::ValueEnum;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::glyph::Glyph;

/// Texture T coordinate convention of the target renderer. DirectX flips T
/// when the sidecar is written; everything upstream stores OpenGL values.
#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
pub enum Coordinates {
    #[value(name = "opengl")]
    OpenGl,
    #[value(name = "directx")]
    DirectX,
}

/// Writer for the XML sidecar describing every packed glyph. Markup is
/// rendered by hand; the format is fixed and flat.
pub struct XmlWriter<W: Write> {
    out: W,
}

impl XmlWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to open {} for writing", path.display()))?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> XmlWriter<W> {
    pub fn new(mut out: W) -> Result<Self> {
        writeln!(out, r#"<?xml version="1.0" encoding="utf-8"?>"#)?;
        writeln!(
            out,
            r#"<font xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema">"#
        )?;
        Ok(Self { out })
    }

    pub fn write_glyph(&mut self, glyph: &Glyph, coordinates: Coordinates) -> Result<()> {
        let (x1, y1, x2, y2) = glyph.quad();
        let (s1, t1, s2, t2) = glyph.texcoords();
        let (t1, t2) = match coordinates {
            Coordinates::OpenGl => (t1, t2),
            Coordinates::DirectX => (1.0 - t1, 1.0 - t2),
        };

        writeln!(self.out, "\t<glyph>")?;
        writeln!(self.out, "\t\t<code>{}</code>", glyph.code())?;
        writeln!(self.out, "\t\t<width>{}</width>", glyph.width())?;
        writeln!(self.out, "\t\t<height>{}</height>", glyph.height())?;
        writeln!(self.out, "\t\t<left>{}</left>", glyph.left())?;
        writeln!(self.out, "\t\t<top>{}</top>", glyph.top())?;
        writeln!(self.out, "\t\t<advance_x>{}</advance_x>", glyph.advance_x())?;
        writeln!(self.out, "\t\t<advance_y>{}</advance_y>", glyph.advance_y())?;
        writeln!(self.out, "\t\t<x1>{x1}</x1>")?;
        writeln!(self.out, "\t\t<y1>{y1}</y1>")?;
        writeln!(self.out, "\t\t<x2>{x2}</x2>")?;
        writeln!(self.out, "\t\t<y2>{y2}</y2>")?;
        writeln!(self.out, "\t\t<s1>{s1}</s1>")?;
        writeln!(self.out, "\t\t<t1>{t1}</t1>")?;
        writeln!(self.out, "\t\t<s2>{s2}</s2>")?;
        writeln!(self.out, "\t\t<t2>{t2}</t2>")?;
        writeln!(self.out, "\t\t<page>{}</page>", glyph.page())?;
        writeln!(self.out, "\t</glyph>")?;
        Ok(())
    }

    pub fn write_texture(&mut self, name: &str) -> Result<()> {
        writeln!(self.out, "\t<texture>{name}</texture>")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        write!(self.out, "</font>")?;
        self.out.flush()?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_glyph() -> Glyph {
        let mut glyph = Glyph::with_crunched(0x41, 4, 4);
        glyph.set_texcoords(0.25, 0.125, 0.5, 0.375);
        glyph.set_page(2);
        glyph
    }

    fn render(coordinates: Coordinates) -> String {
        let mut xml = XmlWriter::new(Vec::new()).unwrap();
        xml.write_glyph(&sample_glyph(), coordinates).unwrap();
        xml.write_texture("atlas_0.png").unwrap();
        let out = xml.into_inner();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn header_declares_schema_namespaces() {
        let xml = XmlWriter::new(Vec::new()).unwrap();
        let out = String::from_utf8(xml.into_inner()).unwrap();
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(out.contains("xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\""));
        assert!(out.contains("xmlns:xsd=\"http://www.w3.org/2001/XMLSchema\""));
    }

    #[test]
    fn finish_closes_the_document() {
        let mut buffer = Vec::new();
        {
            let xml = XmlWriter::new(&mut buffer).unwrap();
            xml.finish().unwrap();
        }
        let out = String::from_utf8(buffer).unwrap();
        assert!(out.ends_with("</font>"));
    }

    #[test]
    fn glyph_record_lists_every_field() {
        let out = render(Coordinates::OpenGl);
        for tag in [
            "code", "width", "height", "left", "top", "advance_x", "advance_y", "x1", "y1", "x2",
            "y2", "s1", "t1", "s2", "t2", "page",
        ] {
            assert!(out.contains(&format!("<{tag}>")), "missing <{tag}>");
        }
        assert!(out.contains("<code>65</code>"));
        assert!(out.contains("<page>2</page>"));
        assert!(out.contains("<texture>atlas_0.png</texture>"));
    }

    #[test]
    fn directx_flips_only_the_t_coordinates() {
        let gl = render(Coordinates::OpenGl);
        let dx = render(Coordinates::DirectX);

        assert!(gl.contains("<t1>0.125</t1>"));
        assert!(gl.contains("<t2>0.375</t2>"));
        assert!(dx.contains("<t1>0.875</t1>"));
        assert!(dx.contains("<t2>0.625</t2>"));

        let strip = |text: &str| -> Vec<String> {
            text.lines()
                .filter(|line| !line.contains("<t1>") && !line.contains("<t2>"))
                .map(str::to_owned)
                .collect()
        };
        assert_eq!(strip(&gl), strip(&dx));
    }
}
