//! Synthetic camera files for the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use camera_fits::block::pad_to_block;
use camera_fits::endian::encode_i32_be;
use camera_fits::header::{serialize_header, Card};
use camera_fits::tiled::compress_tile;
use camera_fits::value::Value;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn card(keyword: &str, value: Value) -> Card {
    Card::new(keyword, value)
}

fn int(keyword: &str, v: usize) -> Card {
    card(keyword, Value::Integer(v as i64))
}

fn string(keyword: &str, v: &str) -> Card {
    card(keyword, Value::String(v.to_string()))
}

/// One amplifier extension to write.
#[derive(Debug, Clone)]
pub struct Amp {
    pub name: String,
    pub channel: i64,
    pub naxis1: usize,
    pub naxis2: usize,
    pub datasec: String,
    /// `CRVAL1Q`, `CRVAL2Q`; the placement is otherwise the identity.
    pub crval: (f64, f64),
    pub pixels: Vec<i32>,
    /// `ZTILE1`, `ZTILE2` when written `GZIP_2` compressed.
    pub tile: Option<(usize, usize)>,
    pub cmptype: &'static str,
}

impl Amp {
    /// A 12x10 readout with a 4x3 datasec at its origin, every pixel `value`.
    pub fn uniform(channel: i64, crval: (f64, f64), value: i32) -> Self {
        Amp {
            name: format!("Segment{channel:02}"),
            channel,
            naxis1: 12,
            naxis2: 10,
            datasec: "[1:4,1:3]".to_string(),
            crval,
            pixels: vec![value; 120],
            tile: None,
            cmptype: "GZIP_2",
        }
    }

    pub fn with_pixels(mut self, pixels: Vec<i32>) -> Self {
        assert_eq!(pixels.len(), self.naxis1 * self.naxis2);
        self.pixels = pixels;
        self
    }

    pub fn with_datasec(mut self, datasec: &str) -> Self {
        self.datasec = datasec.to_string();
        self
    }

    pub fn compressed(mut self, tile_width: usize, tile_height: usize) -> Self {
        self.tile = Some((tile_width, tile_height));
        self
    }

    pub fn with_cmptype(mut self, cmptype: &'static str) -> Self {
        self.cmptype = cmptype;
        self
    }

    fn placement_cards(&self) -> Vec<Card> {
        vec![
            string("EXTNAME", &self.name),
            card("CHANNEL", Value::Integer(self.channel)),
            string("DATASEC", &self.datasec),
            card("PC1_1Q", Value::Float(1.0)),
            card("PC2_2Q", Value::Float(1.0)),
            card("CRVAL1Q", Value::Float(self.crval.0)),
            card("CRVAL2Q", Value::Float(self.crval.1)),
        ]
    }

    fn image_hdu(&self) -> Vec<u8> {
        let mut cards = vec![
            string("XTENSION", "IMAGE"),
            int("BITPIX", 32),
            int("NAXIS", 2),
            int("NAXIS1", self.naxis1),
            int("NAXIS2", self.naxis2),
            int("PCOUNT", 0),
            int("GCOUNT", 1),
        ];
        cards.extend(self.placement_cards());
        let mut hdu = serialize_header(&cards);
        let mut data = encode_i32_be(&self.pixels);
        pad_to_block(&mut data);
        hdu.extend_from_slice(&data);
        hdu
    }

    fn compressed_hdu(&self, tw: usize, th: usize) -> Vec<u8> {
        let across = self.naxis1.div_ceil(tw);
        let down = self.naxis2.div_ceil(th);
        let mut table = Vec::new();
        let mut heap = Vec::new();
        for t in 0..across * down {
            let (x0, y0) = ((t % across) * tw, (t / across) * th);
            let w = tw.min(self.naxis1 - x0);
            let h = th.min(self.naxis2 - y0);
            let tile: Vec<i32> = (0..h)
                .flat_map(|r| self.pixels[(y0 + r) * self.naxis1 + x0..][..w].to_vec())
                .collect();
            let member = compress_tile(&tile);
            table.extend_from_slice(&(member.len() as u32).to_be_bytes());
            table.extend_from_slice(&(heap.len() as u32).to_be_bytes());
            heap.extend_from_slice(&member);
        }

        let mut cards = vec![
            string("XTENSION", "BINTABLE"),
            int("BITPIX", 8),
            int("NAXIS", 2),
            int("NAXIS1", 8),
            int("NAXIS2", across * down),
            int("PCOUNT", heap.len()),
            int("GCOUNT", 1),
            int("TFIELDS", 1),
            string("TFORM1", "1PB"),
            card("ZIMAGE", Value::Logical(true)),
            string("ZCMPTYPE", self.cmptype),
            int("ZBITPIX", 32),
            int("ZNAXIS", 2),
            int("ZNAXIS1", self.naxis1),
            int("ZNAXIS2", self.naxis2),
            int("ZTILE1", tw),
            int("ZTILE2", th),
        ];
        cards.extend(self.placement_cards());
        let mut hdu = serialize_header(&cards);
        let mut data = table;
        data.extend_from_slice(&heap);
        pad_to_block(&mut data);
        hdu.extend_from_slice(&data);
        hdu
    }
}

/// Bytes of a camera file for CCD `R22_<slot>` holding `amps`.
pub fn camera_file(slot: &str, amps: &[Amp]) -> Vec<u8> {
    let primary = [
        card("SIMPLE", Value::Logical(true)),
        int("BITPIX", 8),
        int("NAXIS", 0),
        string("RAFTBAY", "R22"),
        string("CCDSLOT", slot),
    ];
    let mut bytes = serialize_header(&primary);
    for amp in amps {
        match amp.tile {
            Some((tw, th)) => bytes.extend(amp.compressed_hdu(tw, th)),
            None => bytes.extend(amp.image_hdu()),
        }
    }
    bytes
}

pub fn write_camera_file(path: &Path, slot: &str, amps: &[Amp]) {
    std::fs::write(path, camera_file(slot, amps)).unwrap();
}

/// Write a descriptor listing `files`, relative to its directory.
pub fn write_descriptor(dir: &Path, files: &[&str]) -> PathBuf {
    let path = dir.join("mosaic.txt");
    let mut text = String::from("# test mosaic\n\n");
    for f in files {
        text.push_str(f);
        text.push('\n');
    }
    std::fs::write(&path, text).unwrap();
    path
}

/// Two amplifiers of one CCD: A (channel 1, every pixel 100) at the mosaic
/// origin and B (channel 2, every pixel 200) twenty pixels to its right.
pub fn two_amp_mosaic(dir: &Path) -> PathBuf {
    write_camera_file(
        &dir.join("R22_S11.fits"),
        "S11",
        &[Amp::uniform(1, (0.0, 0.0), 100), Amp::uniform(2, (20.0, 0.0), 200)],
    );
    write_descriptor(dir, &["R22_S11.fits"])
}
