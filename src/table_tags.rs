/* Copyright 2014 Google Inc. All Rights Reserved.

   Distributed under MIT license.
   See file LICENSE for detail or copy at https://opensource.org/licenses/MIT
*/

//! Font table tags

use font_types::Tag;

pub const HEAD: Tag = Tag::new(b"head");
pub const HHEA: Tag = Tag::new(b"hhea");
pub const HMTX: Tag = Tag::new(b"hmtx");
pub const GLYF: Tag = Tag::new(b"glyf");
pub const LOCA: Tag = Tag::new(b"loca");
pub const CFF: Tag = Tag::new(b"CFF ");
pub const CFF2: Tag = Tag::new(b"CFF2");

/// Index in the flags byte that means "an explicit 4-byte tag follows"
pub const CUSTOM_TAG_INDEX: u8 = 63;

macro_rules! known_tables {
    ($($variant:ident = $idx:literal => $tag:literal,)*) => {
        /// The tables a WOFF2 directory can name with a single flags byte.
        ///
        /// <https://www.w3.org/TR/WOFF2/#table_dir_format>
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum KnownTable {
            $($variant = $idx,)*
        }

        impl KnownTable {
            pub const ALL: [KnownTable; 63] = [$(KnownTable::$variant,)*];

            pub const fn tag(self) -> Tag {
                match self {
                    $(KnownTable::$variant => Tag::new($tag),)*
                }
            }
        }
    };
}

known_tables! {
    Cmap = 0 => b"cmap",
    Head = 1 => b"head",
    Hhea = 2 => b"hhea",
    Hmtx = 3 => b"hmtx",
    Maxp = 4 => b"maxp",
    Name = 5 => b"name",
    Os2 = 6 => b"OS/2",
    Post = 7 => b"post",
    Cvt = 8 => b"cvt ",
    Fpgm = 9 => b"fpgm",
    Glyf = 10 => b"glyf",
    Loca = 11 => b"loca",
    Prep = 12 => b"prep",
    Cff = 13 => b"CFF ",
    Vorg = 14 => b"VORG",
    Ebdt = 15 => b"EBDT",
    Eblc = 16 => b"EBLC",
    Gasp = 17 => b"gasp",
    Hdmx = 18 => b"hdmx",
    Kern = 19 => b"kern",
    Ltsh = 20 => b"LTSH",
    Pclt = 21 => b"PCLT",
    Vdmx = 22 => b"VDMX",
    Vhea = 23 => b"vhea",
    Vmtx = 24 => b"vmtx",
    Base = 25 => b"BASE",
    Gdef = 26 => b"GDEF",
    Gpos = 27 => b"GPOS",
    Gsub = 28 => b"GSUB",
    Ebsc = 29 => b"EBSC",
    Jstf = 30 => b"JSTF",
    Math = 31 => b"MATH",
    Cbdt = 32 => b"CBDT",
    Cblc = 33 => b"CBLC",
    Colr = 34 => b"COLR",
    Cpal = 35 => b"CPAL",
    Svg = 36 => b"SVG ",
    Sbix = 37 => b"sbix",
    Acnt = 38 => b"acnt",
    Avar = 39 => b"avar",
    Bdat = 40 => b"bdat",
    Bloc = 41 => b"bloc",
    Bsln = 42 => b"bsln",
    Cvar = 43 => b"cvar",
    Fdsc = 44 => b"fdsc",
    Feat = 45 => b"feat",
    Fmtx = 46 => b"fmtx",
    Fvar = 47 => b"fvar",
    Gvar = 48 => b"gvar",
    Hsty = 49 => b"hsty",
    Just = 50 => b"just",
    Lcar = 51 => b"lcar",
    Mort = 52 => b"mort",
    Morx = 53 => b"morx",
    Opbd = 54 => b"opbd",
    Prop = 55 => b"prop",
    Trak = 56 => b"trak",
    Zapf = 57 => b"Zapf",
    Silf = 58 => b"Silf",
    Glat = 59 => b"Glat",
    Gloc = 60 => b"Gloc",
    FeatGraphite = 61 => b"Feat",
    Sill = 62 => b"Sill",
}

/// Tag of a WOFF2 directory entry: one of the 63 known tables or an explicit tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TableTag {
    Known(KnownTable),
    Custom(Tag),
}

impl TableTag {
    /// Look up the known-tag index stored in the low 6 bits of a flags byte.
    ///
    /// Returns `None` for [`CUSTOM_TAG_INDEX`]: the tag is stored explicitly.
    pub fn from_index(index: u8) -> Option<TableTag> {
        KnownTable::ALL
            .get(index as usize)
            .copied()
            .map(TableTag::Known)
    }

    pub fn tag(self) -> Tag {
        match self {
            TableTag::Known(known) => known.tag(),
            TableTag::Custom(tag) => tag,
        }
    }
}

impl From<TableTag> for Tag {
    fn from(value: TableTag) -> Self {
        value.tag()
    }
}
