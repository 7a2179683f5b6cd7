const RULE: &str = "-----------------------------------------------------------------------------";

const COMMANDS: &[(&str, &str)] = &[
    ("exit", "Exit the program"),
    ("help", "Print out the usage, e.g., the entire list of commands"),
    ("host", "Enumerate all hosts"),
    ("host hname info", "Show info of host hname, e.g., host 130.65.159.11 info"),
    (
        "host hname datastore",
        "Enumerate datastores of host hname, e.g., host 130.65.159.11 datastore",
    ),
    (
        "host hname network",
        "Enumerate networks of host hname, e.g., host 130.65.159.11 network",
    ),
    ("vm", "Enumerate all virtual machines"),
    ("vm vname info", "Show info of VM vname, e.g., vm demo-centos7-123 info"),
    (
        "vm vname on",
        "Power on VM vname and wait until task completes, e.g., vm demo-centos7-123 on",
    ),
    (
        "vm vname off",
        "Power off VM vname and wait until task completes, e.g., vm demo-centos7-123 off",
    ),
    (
        "vm vname shutdown",
        "Shutdown guest of VM vname, e.g., vm demo-centos7-123 shutdown",
    ),
];

pub fn lines() -> Vec<String> {
    let mut lines = vec![
        RULE.to_string(),
        format!("{:^77}", "List of Available Commands"),
        RULE.to_string(),
    ];
    lines.extend(
        COMMANDS
            .iter()
            .map(|(usage, summary)| format!("{usage:<24}{summary}")),
    );
    lines
}
