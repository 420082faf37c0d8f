//! Command tables for each protocol variant.
//!
//! Every command is described by a [`CommandSpec`]: its three-letter wire
//! code, the ordered argument names it accepts, and the ordered field layouts
//! of its success (`C`) and error (`E`) replies. Commands with more than one
//! layout are decoded against each layout in turn, so firmware that reports
//! a shorter reply still decodes.
//!
//! The tables are immutable statics selected through [`Variant`]. A variant
//! only lists the commands it adds or overrides; everything else falls back to
//! the [`Variant::Default`] table.

/// Define a static command table.
///
/// Each entry is `name => "CODE" { args: [...], reply: [[...], ...], error: [[...], ...] }`.
/// Names and fields are written as bare identifiers and stored as strings.
macro_rules! command_table {
    (
        $(#[$attr:meta])*
        static $table:ident = [
            $(
                $name:ident => $code:literal {
                    args: [$($arg:ident),* $(,)?],
                    reply: [$([$($ok:ident),* $(,)?]),* $(,)?],
                    error: [$([$($err:ident),* $(,)?]),* $(,)?] $(,)?
                }
            ),+
            $(,)?
        ];
    ) => {
        $(#[$attr])*
        static $table: &[CommandSpec] = &[
            $(
                CommandSpec {
                    name: stringify!($name),
                    code: $code,
                    args: &[$(stringify!($arg)),*],
                    reply_layouts: &[$(&[$(stringify!($ok)),*]),*],
                    error_layouts: &[$(&[$(stringify!($err)),*]),*],
                }
            ),+
        ];
    };
}

/// Define a public constant holding the name of each command.
macro_rules! command_names {
    ($($name:ident),+ $(,)?) => {
        paste::paste! {
            $(
                #[doc = "The name of the `" $name "` command."]
                pub const [<$name:upper>]: &str = stringify!($name);
            )+
        }
    };
}

command_names! {
    move_free,
    move_relative,
    move_absolute,
    move_stop,
    home,
    identify,
    read_position,
    read_vel_tbl,
    read_status,
    write_vel_tbl,
    read_axis,
}

/// The description of a single command.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct CommandSpec {
    name: &'static str,
    code: &'static str,
    args: &'static [&'static str],
    reply_layouts: &'static [&'static [&'static str]],
    error_layouts: &'static [&'static [&'static str]],
}

impl CommandSpec {
    /// The name the command is looked up by.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The three-letter code sent on the wire.
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// The argument names, in the order they are serialized.
    pub fn args(&self) -> &'static [&'static str] {
        self.args
    }

    /// Whether the command takes an argument with the given name.
    pub fn takes(&self, arg: &str) -> bool {
        self.args.iter().any(|name| *name == arg)
    }

    /// The success reply layouts, in the order they are tried.
    pub fn reply_layouts(&self) -> &'static [&'static [&'static str]] {
        self.reply_layouts
    }

    /// The error reply layouts, in the order they are tried.
    pub fn error_layouts(&self) -> &'static [&'static [&'static str]] {
        self.error_layouts
    }
}

command_table! {
    /// The commands understood by every controller.
    static DEFAULT_TABLE = [
        move_free => "FRP" {
            args: [ax_num, vel_no, dir],
            reply: [[ax_num]],
            error: [[ax_num, error_num], [error_num]],
        },
        move_relative => "RPS" {
            args: [ax_num, vel_no, length, pat],
            reply: [[ax_num]],
            error: [[ax_num, error_num], [error_num]],
        },
        move_absolute => "APS" {
            args: [ax_num, vel_no, length, pat],
            reply: [[ax_num]],
            error: [[ax_num, error_num], [error_num]],
        },
        move_stop => "STP" {
            args: [ax_num, pat],
            reply: [[ax_num]],
            error: [[ax_num, error_num], [error_num]],
        },
        home => "ORG" {
            args: [ax_num, vel_no, pat],
            reply: [[ax_num]],
            error: [[ax_num, error_num], [error_num]],
        },
        identify => "IDN" {
            args: [],
            reply: [[dev_name, dev_var]],
            error: [[error_num]],
        },
        read_position => "RDP" {
            args: [ax_num],
            reply: [[ax_num, pos]],
            error: [[ax_num, error_num], [error_num]],
        },
        read_vel_tbl => "RTB" {
            args: [ax_num, vel_no],
            reply: [[ax_num, vel_no, start_vel, max_vel, acc_time, acc_type]],
            error: [[ax_num, error_num], [error_num]],
        },
        read_status => "STR" {
            args: [ax_num],
            reply: [[ax_num, status, org_sta, norg_sta, ccw_sta, cw_sta]],
            error: [[ax_num, error_num], [error_num]],
        },
        write_vel_tbl => "WTB" {
            args: [ax_num, vel_no, start_vel, max_vel, acc_time, acc_type],
            reply: [[ax_num]],
            error: [[ax_num, error_num], [error_num]],
        },
    ];
}

command_table! {
    /// Commands the Aries controllers add or change.
    static ARIES_TABLE = [
        read_vel_tbl => "RTB" {
            args: [ax_num, vel_no],
            reply: [
                [ax_num, vel_no, start_vel, max_vel, acc_time, dec_time, acc_type],
                [ax_num, vel_no, start_vel, max_vel, acc_time, acc_type],
            ],
            error: [[ax_num, error_num], [error_num]],
        },
        write_vel_tbl => "WTB" {
            args: [ax_num, vel_no, start_vel, max_vel, acc_time, dec_time, acc_type],
            reply: [[ax_num]],
            error: [[ax_num, error_num], [error_num]],
        },
        read_status => "STR" {
            args: [ax_num],
            reply: [
                [ax_num, status, org_sta, norg_sta, ccw_sta, cw_sta, alm_sta],
                [ax_num, status, org_sta, norg_sta, ccw_sta, cw_sta],
            ],
            error: [[ax_num, error_num], [error_num]],
        },
        read_axis => "RAX" {
            args: [],
            reply: [[
                ax_num, control_num,
                island_0, island_1, island_2, island_3,
                island_4, island_5, island_6, island_7,
            ]],
            error: [[error_num]],
        },
    ];
}

/// A dialect of the command protocol.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// The base command set.
    #[default]
    Default,
    /// Aries controllers: separate deceleration times, an alarm status and
    /// the `read_axis` command.
    Aries,
}

impl Variant {
    /// All variants.
    pub const ALL: [Variant; 2] = [Variant::Default, Variant::Aries];

    /// The commands this variant adds to or overrides in the default table.
    fn overrides(self) -> &'static [CommandSpec] {
        match self {
            Variant::Default => &[],
            Variant::Aries => ARIES_TABLE,
        }
    }

    /// Look up a command by name.
    pub fn command(self, name: &str) -> Option<&'static CommandSpec> {
        self.overrides()
            .iter()
            .chain(DEFAULT_TABLE)
            .find(|spec| spec.name == name)
    }

    /// Iterate over every command available in this variant.
    pub fn commands(self) -> impl Iterator<Item = &'static CommandSpec> {
        let overrides = self.overrides();
        overrides.iter().chain(
            DEFAULT_TABLE
                .iter()
                .filter(move |spec| !overrides.iter().any(|o| o.name == spec.name)),
        )
    }

    /// The acceleration type codes the variant accepts in `write_vel_tbl`.
    pub fn acc_types(self) -> &'static [i64] {
        match self {
            Variant::Default => &[1, 2],
            Variant::Aries => &[1, 2, 3],
        }
    }

    /// The lowercase name of the variant.
    pub fn as_str(self) -> &'static str {
        match self {
            Variant::Default => "default",
            Variant::Aries => "aries",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
