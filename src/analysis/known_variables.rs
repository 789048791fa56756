//! Documentation for commonly used BitBake variables and keywords.

pub struct KnownVariable {
    pub name: &'static str,
    pub doc: &'static str,
}

const fn var(name: &'static str, doc: &'static str) -> KnownVariable {
    KnownVariable { name, doc }
}

pub static KNOWN_VARIABLES: &[KnownVariable] = &[
    var("B", "Directory in which the build happens (defaults to `${S}`)."),
    var("BB_NUMBER_THREADS", "Maximum number of tasks BitBake runs in parallel."),
    var("BBCLASSEXTEND", "Extends the recipe to other variants such as `native` or `nativesdk`."),
    var("BBFILE_COLLECTIONS", "Names of the layer collections defined by `layer.conf`."),
    var("BBFILES", "Recipe files BitBake parses."),
    var("BBLAYERS", "Layers enabled in the build."),
    var("BPN", "Recipe name with common prefixes and suffixes such as `-native` removed."),
    var("COMPATIBLE_MACHINE", "Regular expression of machines the recipe builds for."),
    var("D", "Destination directory where `do_install` places files."),
    var("DEPENDS", "Build-time dependencies of the recipe."),
    var("DESCRIPTION", "Long description of the recipe."),
    var("DISTRO", "Short name of the distribution."),
    var("DISTRO_FEATURES", "Features enabled for the distribution."),
    var("EXTRA_OECMAKE", "Extra arguments passed to CMake."),
    var("EXTRA_OECONF", "Extra arguments passed to `configure`."),
    var("EXTRA_OEMAKE", "Extra arguments passed to `make`."),
    var("FILES", "Files and directories packaged into each package."),
    var("FILESEXTRAPATHS", "Extra directories searched for local `file://` sources."),
    var("HOMEPAGE", "Upstream project URL."),
    var("IMAGE_FEATURES", "Features included in an image."),
    var("IMAGE_INSTALL", "Packages installed into an image."),
    var("INHERIT", "Classes inherited globally by every recipe."),
    var("LICENSE", "License of the source code."),
    var("LIC_FILES_CHKSUM", "Checksums of license text in the source tree."),
    var("MACHINE", "Target machine of the build."),
    var("MACHINE_FEATURES", "Hardware features of the target machine."),
    var("PACKAGECONFIG", "Enabled optional features of the recipe."),
    var("PACKAGES", "Packages created by the recipe."),
    var("PE", "Package epoch."),
    var("PN", "Recipe name."),
    var("PR", "Package revision."),
    var("PROVIDES", "Additional names the recipe provides."),
    var("PV", "Recipe version."),
    var("RDEPENDS", "Runtime dependencies of a package."),
    var("RPROVIDES", "Additional runtime names a package provides."),
    var("RRECOMMENDS", "Soft runtime dependencies of a package."),
    var("S", "Directory of the unpacked source code."),
    var("SRCREV", "Revision of the source code for SCM fetchers."),
    var("SRC_URI", "Source files fetched for the recipe."),
    var("SUMMARY", "One-line description of the recipe."),
    var("SYSROOT_DIRS", "Directories staged into the sysroot."),
    var("T", "Temporary directory holding task logs and scripts."),
    var("TMPDIR", "Base directory of the build output."),
    var("WORKDIR", "Working directory of the recipe."),
    var("bindir", "Executable directory, usually `/usr/bin`."),
    var("datadir", "Read-only architecture-independent data, usually `/usr/share`."),
    var("includedir", "Header directory, usually `/usr/include`."),
    var("libdir", "Library directory, usually `/usr/lib`."),
    var("sbindir", "System executable directory, usually `/usr/sbin`."),
    var("sysconfdir", "Configuration directory, usually `/etc`."),
];

pub static KEYWORDS: &[&str] = &[
    "addhandler",
    "addtask",
    "after",
    "before",
    "def",
    "deltask",
    "EXPORT_FUNCTIONS",
    "export",
    "fakeroot",
    "include",
    "include_all",
    "inherit",
    "inherit_defer",
    "python",
    "require",
    "unset",
];

pub fn lookup(name: &str) -> Option<&'static KnownVariable> {
    KNOWN_VARIABLES.iter().find(|v| v.name == name)
}
