//! End-to-end recipe behavior over a scripted transport.

mod common;

use common::{harness, harness_with, LogEntry, RefusingConnector, Script};

use std::sync::Arc;
use std::time::Duration;

use deckhand::config::DeployFile;
use deckhand::executor::{Executor, Runner};
use deckhand::{recipe, Error};

const PID_FILE: &str = "/var/www/shelr/shared/pids/unicorn.pid";

fn with_pid(script: &Script) {
    script.on(&format!("cat {}", PID_FILE), "4242\n");
}

#[tokio::test]
async fn stop_kills_the_pid_on_every_app_host() {
    let (runner, script) = harness();
    with_pid(&script);

    runner.invoke("deploy:stop", None).await.unwrap();

    let commands = script.commands();
    for host in ["app1", "app2"] {
        assert!(commands
            .iter()
            .any(|(h, c)| h == host && c == &format!("cat {}", PID_FILE)));
        assert!(commands
            .iter()
            .any(|(h, c)| h == host && c == "kill -9 4242"));
    }
    // web and db hosts stay untouched
    assert!(commands.iter().all(|(h, _)| h == "app1" || h == "app2"));
}

#[tokio::test]
async fn restart_sends_usr2() {
    let (runner, script) = harness();
    with_pid(&script);

    runner.invoke("deploy:restart", None).await.unwrap();
    assert!(script.ran("kill -USR2 4242"));
    assert!(!script.ran("kill -9"));
}

#[tokio::test]
async fn start_launches_unicorn_in_the_current_release() {
    let (runner, script) = harness();
    runner.invoke("deploy:start", None).await.unwrap();

    let expected = "cd /var/www/shelr/current && \
         bundle exec unicorn -E production -D -c config/unicorn.production.rb";
    assert!(script.commands().iter().any(|(_, c)| c == expected));
}

#[tokio::test]
async fn garbage_in_the_pid_file_aborts_before_kill() {
    let (runner, script) = harness();
    script.on(&format!("cat {}", PID_FILE), "no such file\n");

    let err = runner.invoke("deploy:stop", None).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(!script.ran("kill"));
}

#[tokio::test]
async fn apply_renders_uploads_then_reloads() {
    let tmp = tempfile::tempdir().unwrap();
    let template = tmp.path().join("unicorn.rb.j2");
    std::fs::write(&template, "pid \"{{ pid_file }}\"\napp {{ application }}\n").unwrap();

    let staging = tmp.path().join("staging");
    let (runner, script) = harness_with(|settings| {
        settings.unicorn_template = template.clone();
        settings.staging_dir = staging.clone();
    });
    with_pid(&script);

    runner.invoke("config:unicorn:apply", None).await.unwrap();

    // generate wrote the rendered config into the staging directory
    let staged = std::fs::read_to_string(staging.join("unicorn.production.rb")).unwrap();
    assert_eq!(staged, format!("pid \"{}\"\napp shelr\n", PID_FILE));

    // upload pushed it to both app hosts before any signal was sent
    let entries = script.entries();
    let first_upload = entries
        .iter()
        .position(|e| matches!(e, LogEntry::Upload { .. }))
        .expect("no upload observed");
    let first_signal = entries
        .iter()
        .position(
            |e| matches!(e, LogEntry::Exec { command, .. } if command.contains("kill -HUP")),
        )
        .expect("no reload observed");
    assert!(first_upload < first_signal);

    let uploads: Vec<_> = entries
        .iter()
        .filter_map(|e| match e {
            LogEntry::Upload { host, remote, .. } => Some((host.clone(), remote.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(uploads.len(), 2);
    for (_, remote) in &uploads {
        assert_eq!(
            remote.to_str().unwrap(),
            "/var/www/shelr/current/config/unicorn.production.rb"
        );
    }
}

#[tokio::test]
async fn missing_template_variable_fails_the_chain() {
    let tmp = tempfile::tempdir().unwrap();
    let template = tmp.path().join("unicorn.rb.j2");
    std::fs::write(&template, "socket \"{{ listen_socket }}\"\n").unwrap();

    let (runner, script) = harness_with(|settings| {
        settings.unicorn_template = template.clone();
        settings.staging_dir = tmp.path().join("staging");
    });

    let err = runner.invoke("config:unicorn:apply", None).await.unwrap_err();
    assert!(matches!(
        err,
        Error::TemplateUndefined { variable, .. } if variable == "listen_socket"
    ));
    // nothing reached a host
    assert!(script.entries().is_empty());
}

#[tokio::test]
async fn config_cp_copies_shared_configs_into_the_release() {
    let (runner, script) = harness();
    runner.invoke("config:cp", None).await.unwrap();

    let commands = script.commands();
    let expected = "cp -Rf /var/www/shelr/shared/configs/* /var/www/shelr/current/config";
    for host in ["app1", "app2"] {
        assert!(commands.iter().any(|(h, c)| h == host && c == expected));
    }
    assert!(commands.iter().all(|(h, _)| h == "app1" || h == "app2"));
}

#[tokio::test]
async fn backup_download_uses_the_latest_remote_version() {
    let (runner, script) = harness();
    script.on("ls -t | head -1", "backup_3\n");

    runner.invoke("backup:download", None).await.unwrap();

    let commands = script.commands();
    assert!(commands.iter().any(|(h, c)| h == "db1"
        && c == "cd /var/www/shelr/shared/backups && ls -t | head -1"));
    assert!(commands.iter().any(|(h, c)| h == "db1"
        && c == "cd /var/www/shelr/shared/backups && tar -czf backup_3.tar.gz backup_3"));
    assert!(commands
        .iter()
        .any(|(h, c)| h == "db1" && c == "rm /var/www/shelr/shared/backups/backup_3.tar.gz"));

    // local unpack happens on the control node
    assert!(commands
        .iter()
        .any(|(h, c)| h == "localhost" && c == "mkdir -p backups"));
    assert!(commands
        .iter()
        .any(|(h, c)| h == "localhost" && c == "cd backups && tar -zxf backup_3.tar.gz"));

    let downloads: Vec<_> = script
        .entries()
        .into_iter()
        .filter(|e| matches!(e, LogEntry::Download { .. }))
        .collect();
    assert_eq!(downloads.len(), 1);
}

#[tokio::test]
async fn explicit_backup_version_skips_the_latest_lookup() {
    let (runner, script) =
        harness_with(|settings| settings.backup_version = Some("backup_7".to_string()));

    runner.invoke("backup:download", None).await.unwrap();

    assert!(!script.ran("ls -t"));
    assert!(script.ran("tar -czf backup_7.tar.gz backup_7"));
}

#[tokio::test]
async fn empty_backup_listing_aborts_the_download() {
    let (runner, script) = harness();
    // no rule for the listing: capture returns an empty string

    let err = runner.invoke("backup:download", None).await.unwrap_err();
    match err {
        Error::Config(message) => {
            assert!(message.contains("/var/www/shelr/shared/backups"));
        }
        other => panic!("expected Config, got {:?}", other),
    }
    assert!(!script.ran("tar"));
    assert!(script.entries().len() == 1);
}

#[tokio::test]
async fn backup_tasks_only_touch_the_primary_db_host() {
    let (runner, script) = harness();
    runner.invoke("backup:create", None).await.unwrap();

    let commands = script.commands();
    assert_eq!(commands.len(), 1);
    let (host, command) = &commands[0];
    assert_eq!(host, "db1");
    assert_eq!(
        command,
        "cd /var/www/shelr/current && export RAILS_ENV=production && \
         export BACKUP_DIR=/var/www/shelr/shared/backups && export SKIP_TABLES=sessions && \
         bundle exec rake db:backup:create"
    );
}

#[tokio::test]
async fn mirror_restores_locally_from_the_downloaded_version() {
    let (runner, script) = harness();
    script.on("ls -t | head -1", "backup_3\n");

    runner.invoke("backup:mirror", None).await.unwrap();

    let commands = script.commands();
    let (host, restore) = commands.last().unwrap();
    assert_eq!(host, "localhost");
    assert_eq!(
        restore,
        "export BACKUP_DIR=backups/backup_3 && bundle exec rake db:backup:restore"
    );
}

#[tokio::test]
async fn mirror_aborts_when_the_remote_backup_fails() {
    let (runner, script) = harness();
    script.fail_on("db:backup:create", 1, "disk full");

    let err = runner.invoke("backup:mirror", None).await.unwrap_err();
    match err {
        Error::CommandExit {
            host,
            exit_code,
            stderr,
            ..
        } => {
            assert_eq!(host, "db1");
            assert_eq!(exit_code, 1);
            assert_eq!(stderr, "disk full");
        }
        other => panic!("expected CommandExit, got {:?}", other),
    }
    // nothing after the failed create ran
    assert!(!script.ran("ls -t"));
    assert!(!script.ran("tar"));
    assert!(!script.ran("db:backup:restore"));
}

#[tokio::test]
async fn solr_restart_stops_before_starting() {
    let (runner, script) = harness();
    runner.invoke("solr:restart", None).await.unwrap();

    let commands: Vec<_> = script
        .commands()
        .into_iter()
        .filter(|(h, _)| h == "app1")
        .map(|(_, c)| c)
        .collect();
    assert_eq!(
        commands,
        [
            "cd /var/www/shelr/current && export RAILS_ENV=production && \
             bundle exec rake sunspot:solr:stop",
            "cd /var/www/shelr/current && export RAILS_ENV=production && \
             bundle exec rake sunspot:solr:start",
        ]
    );
}

#[tokio::test]
async fn sitemap_refresh_generates_then_publishes() {
    let (runner, script) = harness();
    runner.invoke("sitemap:refresh", None).await.unwrap();

    let commands: Vec<_> = script
        .commands()
        .into_iter()
        .filter(|(h, _)| h == "app2")
        .map(|(_, c)| c)
        .collect();
    assert_eq!(
        commands,
        [
            "cd /var/www/shelr/current && export RAILS_ENV=production && \
             bundle exec rake sitemap:refresh",
            "cd /var/www/shelr/current && mv public/sitemap* public/assets/",
        ]
    );
}

#[tokio::test]
async fn sitemap_copy_old_guards_on_existence() {
    let (runner, script) = harness();
    runner.invoke("sitemap:copy_old", None).await.unwrap();

    assert!(script.ran(
        "if [ -e /var/www/shelr/current/public/sitemap_index.xml.gz ]; \
         then cp /var/www/shelr/current/public/sitemap* /var/www/shelr/current/public/; fi"
    ));
}

#[tokio::test]
async fn role_override_narrows_a_chain() {
    let (runner, script) = harness();
    runner.invoke("solr:start", Some("web")).await.unwrap();

    let commands = script.commands();
    assert!(!commands.is_empty());
    assert!(commands.iter().all(|(h, _)| h == "web1"));
}

#[tokio::test]
async fn unknown_task_fails_before_any_connection() {
    let (runner, script) = harness();
    let err = runner.invoke("deploy:typo", None).await.unwrap_err();
    assert!(matches!(err, Error::UnknownTask(name) if name == "deploy:typo"));
    assert!(script.entries().is_empty());
}

#[tokio::test]
async fn refused_connections_surface_as_connection_failed() {
    let (settings, inventory, _) = DeployFile::from_yaml(common::DEPLOY_YAML)
        .unwrap()
        .resolve()
        .unwrap();
    let executor = Arc::new(Executor::new(
        Arc::new(RefusingConnector),
        Duration::from_secs(5),
    ));
    let runner = Runner::new(recipe::build_registry().unwrap(), inventory, settings, executor)
        .unwrap();

    let err = runner.invoke("solr:start", None).await.unwrap_err();
    assert!(matches!(err, Error::ConnectionFailed { .. }));
}
